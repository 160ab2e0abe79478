//! Move coordinator: move, undo and position override.
//!
//! Every operation ends by broadcasting the session's current position to
//! both bound connections, whether or not the position changed. A rejected
//! move is never reported as an error; the requester simply resynchronizes
//! to the authoritative board.

use crate::connections::Outbound;
use crate::session::Session;
use chesslink_core::{ChessLinkResult, MoveRequest, PositionEngine, ServerEvent};
use tracing::debug;

/// Apply `mv` if the engine accepts it, then broadcast.
pub fn apply_move<E: PositionEngine>(session: &mut Session<E>, mv: &MoveRequest) -> Vec<Outbound> {
    match session.position().play(mv) {
        Some(next) => {
            session.advance(next);
            debug!(session = %session.key(), mv = %mv, ply = session.history_len(), "move applied");
        }
        None => {
            debug!(session = %session.key(), mv = %mv, "move rejected");
        }
    }
    broadcast_position(session)
}

/// Revert one ply if there is one, then broadcast.
pub fn undo<E: PositionEngine>(session: &mut Session<E>) -> Vec<Outbound> {
    if session.rewind() {
        debug!(session = %session.key(), ply = session.history_len(), "move undone");
    } else {
        debug!(session = %session.key(), "nothing to undo");
    }
    broadcast_position(session)
}

/// Replace the position with one parsed from `notation`, then broadcast.
///
/// Only parseability is checked; the new position need not be reachable from
/// the old one. Unparseable text leaves the session untouched and broadcasts
/// nothing.
pub fn override_state<E: PositionEngine>(
    session: &mut Session<E>,
    notation: &str,
) -> ChessLinkResult<Vec<Outbound>> {
    let position = E::parse(notation)?;
    session.load(position);
    debug!(session = %session.key(), "position overridden");
    Ok(broadcast_position(session))
}

/// `boardstate` with the position only, to every bound connection.
pub fn broadcast_position<E: PositionEngine>(session: &Session<E>) -> Vec<Outbound> {
    let position = session.notation();
    session
        .bound()
        .into_iter()
        .map(|(_, conn)| Outbound::new(conn, ServerEvent::board_state(position.clone(), None)))
        .collect()
}

/// `boardstate` with the position and each recipient's own color.
pub fn full_state<E: PositionEngine>(session: &Session<E>) -> Vec<Outbound> {
    let position = session.notation();
    session
        .bound()
        .into_iter()
        .map(|(role, conn)| {
            Outbound::new(
                conn,
                ServerEvent::board_state(position.clone(), session.color(role)),
            )
        })
        .collect()
}
