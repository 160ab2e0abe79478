//! Auxiliary relay: forwards ephemeral UI signals to the counterpart.
//!
//! Highlights, cursor position and drag state are never stored. The sender's
//! counterpart is always the other slot of the sender's session; if nobody is
//! bound there the event is dropped.

use crate::connections::Outbound;
use crate::session::Session;
use chesslink_core::{PositionEngine, RelayEvent, Role, ServerEvent};
use tracing::debug;

/// Route `event` from the `sender` slot to the opposite slot.
pub fn forward<E: PositionEngine>(
    session: &Session<E>,
    sender: Role,
    event: RelayEvent,
) -> Option<Outbound> {
    let counterpart = sender.other();
    match session.connection(counterpart) {
        Some(to) => Some(Outbound::new(to, ServerEvent::Relay(event))),
        None => {
            debug!(
                session = %session.key(),
                event = event.name(),
                "no counterpart bound, dropping relay event"
            );
            None
        }
    }
}
