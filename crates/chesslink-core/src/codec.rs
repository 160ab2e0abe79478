//! JSON text framing for chesslink events.
//!
//! Wire format: one text frame per event, `{"event": <name>, "payload": <object>}`.
//! `payload` may be omitted or `null` for events without fields, and may also
//! arrive as a JSON string holding the encoded object.

use crate::error::{ChessLinkError, ChessLinkResult};
use crate::messages::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFrame {
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Serialize)]
struct Frame<'a, T: Serialize> {
    event: &'a str,
    payload: &'a T,
}

/// Decode one inbound text frame into a typed event.
///
/// Fails on unknown events, unknown or missing payload fields, and wrong types.
pub fn decode_client_event(text: &str) -> ChessLinkResult<ClientEvent> {
    let raw: RawFrame = serde_json::from_str(text)?;
    let payload = match raw.payload {
        Value::Null => Value::Object(Map::new()),
        Value::String(encoded) => serde_json::from_str(&encoded)?,
        other => other,
    };

    let event = match raw.event.as_str() {
        "newgame" => ClientEvent::NewGame(fields(payload)?),
        "createSession" => ClientEvent::CreateSession(fields(payload)?),
        "joinSession" => ClientEvent::JoinSession(fields(payload)?),
        "move" => ClientEvent::Move(fields(payload)?),
        "undo" => {
            fields::<EmptyPayload>(payload)?;
            ClientEvent::Undo
        }
        "setstate" => ClientEvent::SetState(fields(payload)?),
        "endgame" => ClientEvent::EndGame(fields(payload)?),
        "endSession" => ClientEvent::EndSession(fields(payload)?),
        "lastmove" => ClientEvent::Relay(RelayEvent::LastMove(fields(payload)?)),
        "addgrey" => ClientEvent::Relay(RelayEvent::AddGrey(fields(payload)?)),
        "removegrey" => {
            fields::<EmptyPayload>(payload)?;
            ClientEvent::Relay(RelayEvent::RemoveGrey)
        }
        "mousexy" => ClientEvent::Relay(RelayEvent::MouseXy(fields(payload)?)),
        "piecedrop" => {
            fields::<EmptyPayload>(payload)?;
            ClientEvent::Relay(RelayEvent::PieceDrop)
        }
        "piecedrag" => ClientEvent::Relay(RelayEvent::PieceDrag(fields(payload)?)),
        "highlight" => ClientEvent::Relay(RelayEvent::Highlight(fields(payload)?)),
        other => {
            return Err(ChessLinkError::InvalidMessage(format!(
                "unknown event: {other}"
            )))
        }
    };
    Ok(event)
}

/// Encode an outbound event into a text frame.
pub fn encode_server_event(event: &ServerEvent) -> ChessLinkResult<String> {
    let name = event.name();
    match event {
        ServerEvent::BoardState(p) => to_frame(name, p),
        ServerEvent::SessionCreated(p) | ServerEvent::SessionJoined(p) => to_frame(name, p),
        ServerEvent::Error(p) => to_frame(name, p),
        ServerEvent::Reset => to_frame(name, &EmptyPayload {}),
        ServerEvent::Relay(relay) => match relay {
            RelayEvent::LastMove(p) | RelayEvent::Highlight(p) => to_frame(name, p),
            RelayEvent::AddGrey(p) => to_frame(name, p),
            RelayEvent::MouseXy(p) => to_frame(name, p),
            RelayEvent::PieceDrag(p) => to_frame(name, p),
            RelayEvent::RemoveGrey | RelayEvent::PieceDrop => to_frame(name, &EmptyPayload {}),
        },
    }
}

fn fields<T: DeserializeOwned>(payload: Value) -> ChessLinkResult<T> {
    Ok(serde_json::from_value(payload)?)
}

fn to_frame<T: Serialize>(event: &str, payload: &T) -> ChessLinkResult<String> {
    Ok(serde_json::to_string(&Frame { event, payload })?)
}
