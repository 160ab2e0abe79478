//! chesslink event messages.
//!
//! Every frame on the wire is a JSON object `{"event": <name>, "payload": {...}}`.
//! Inbound payload structs reject unknown fields; see [`crate::codec`] for the
//! decode step that maps event names onto [`ClientEvent`] variants.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two participant slots of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Mentor,
}

impl Role {
    /// The counterpart slot.
    pub fn other(self) -> Role {
        match self {
            Role::Student => Role::Mentor,
            Role::Mentor => Role::Student,
        }
    }

    /// Color a participant receives when its role creates the session.
    pub fn creator_color(self) -> Color {
        match self {
            Role::Mentor => Color::Light,
            Role::Student => Color::Dark,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Student => f.write_str("student"),
            Role::Mentor => f.write_str("mentor"),
        }
    }
}

/// Board side. Serialized as the piece color the client renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    #[serde(rename = "white")]
    Light,
    #[serde(rename = "black")]
    Dark,
}

impl Color {
    pub fn complement(self) -> Color {
        match self {
            Color::Light => Color::Dark,
            Color::Dark => Color::Light,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Light => f.write_str("white"),
            Color::Dark => f.write_str("black"),
        }
    }
}

// ── Inbound payloads ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewGamePayload {
    pub student: String,
    pub mentor: String,
    pub role: Role,
}

/// Payload of both `createSession` and `joinSession`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SessionRequestPayload {
    pub session_id: String,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MovePayload {
    pub from: String,
    pub to: String,
    /// Promotion piece letter (`q`, `r`, `b`, `n`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetStatePayload {
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndGamePayload {
    pub student: String,
    pub mentor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct EndSessionPayload {
    pub session_id: String,
}

/// `lastmove` and `highlight`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SquarePairPayload {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SquarePayload {
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CursorPayload {
    /// Kept as the sender's JSON number so relays stay byte-exact.
    pub x: serde_json::Number,
    pub y: serde_json::Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PiecePayload {
    pub piece: String,
}

/// Payload for events that carry no fields. Serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmptyPayload {}

// ── Outbound payloads ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardStatePayload {
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

/// Payload of `sessionCreated` and `sessionJoined`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatePayload {
    pub position: String,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

// ── Events ──────────────────────────────────────────────────────────

/// Ephemeral UI signals forwarded verbatim to the counterpart.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    LastMove(SquarePairPayload),
    AddGrey(SquarePayload),
    RemoveGrey,
    MouseXy(CursorPayload),
    PieceDrop,
    PieceDrag(PiecePayload),
    Highlight(SquarePairPayload),
}

impl RelayEvent {
    /// Wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            RelayEvent::LastMove(_) => "lastmove",
            RelayEvent::AddGrey(_) => "addgrey",
            RelayEvent::RemoveGrey => "removegrey",
            RelayEvent::MouseXy(_) => "mousexy",
            RelayEvent::PieceDrop => "piecedrop",
            RelayEvent::PieceDrag(_) => "piecedrag",
            RelayEvent::Highlight(_) => "highlight",
        }
    }
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    NewGame(NewGamePayload),
    CreateSession(SessionRequestPayload),
    JoinSession(SessionRequestPayload),
    Move(MovePayload),
    Undo,
    SetState(SetStatePayload),
    EndGame(EndGamePayload),
    EndSession(EndSessionPayload),
    Relay(RelayEvent),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::NewGame(_) => "newgame",
            ClientEvent::CreateSession(_) => "createSession",
            ClientEvent::JoinSession(_) => "joinSession",
            ClientEvent::Move(_) => "move",
            ClientEvent::Undo => "undo",
            ClientEvent::SetState(_) => "setstate",
            ClientEvent::EndGame(_) => "endgame",
            ClientEvent::EndSession(_) => "endSession",
            ClientEvent::Relay(r) => r.name(),
        }
    }
}

/// An event pushed from the server to one connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    BoardState(BoardStatePayload),
    SessionCreated(SessionStatePayload),
    SessionJoined(SessionStatePayload),
    Error(ErrorPayload),
    Reset,
    Relay(RelayEvent),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::BoardState(_) => "boardstate",
            ServerEvent::SessionCreated(_) => "sessionCreated",
            ServerEvent::SessionJoined(_) => "sessionJoined",
            ServerEvent::Error(_) => "error",
            ServerEvent::Reset => "reset",
            ServerEvent::Relay(r) => r.name(),
        }
    }

    pub fn board_state(position: String, color: Option<Color>) -> Self {
        ServerEvent::BoardState(BoardStatePayload { position, color })
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }
}
