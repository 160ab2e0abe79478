//! Event dispatch: decodes inbound frames and routes them to the registry,
//! the move coordinator and the relay.
//!
//! All handling runs under one registry lock, so each event (including the
//! broadcasts it produces) completes before the next one is looked at.
//! Delivery happens after the lock is released and never blocks.

use crate::connections::{ConnectionTable, Outbound};
use crate::coordinator;
use crate::relay;
use crate::session::{ConnectionId, Resolution, SessionKey, SessionRegistry};
use chesslink_core::messages::{SessionRequestPayload, SessionStatePayload};
use chesslink_core::{
    decode_client_event, ChessLinkError, ChessPosition, ClientEvent, MoveRequest, PositionEngine,
    ServerEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Owns the session registry and fans results out through the connection table.
pub struct Dispatcher<E = ChessPosition> {
    registry: Mutex<SessionRegistry<E>>,
    connections: Arc<ConnectionTable>,
}

impl<E: PositionEngine> Dispatcher<E> {
    pub fn new(registry: SessionRegistry<E>, connections: Arc<ConnectionTable>) -> Self {
        Self {
            registry: Mutex::new(registry),
            connections,
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionTable> {
        &self.connections
    }

    /// Decode and handle one text frame. Malformed frames are logged and dropped.
    pub async fn handle_frame(&self, conn: ConnectionId, text: &str) {
        match decode_client_event(text) {
            Ok(event) => self.handle(conn, event).await,
            Err(e) => warn!(conn = %conn, error = %e, "dropping malformed frame"),
        }
    }

    /// Handle one decoded event.
    pub async fn handle(&self, conn: ConnectionId, event: ClientEvent) {
        debug!(conn = %conn, event = event.name(), "event received");
        let outbound = {
            let mut registry = self.registry.lock().await;
            route(&mut registry, conn, event)
        };
        self.connections.deliver(outbound).await;
    }

    /// Expire idle sessions and tell anyone still bound to reset.
    pub async fn gc(&self, max_idle: Duration) -> usize {
        let removed = self.registry.lock().await.gc(max_idle);
        let outbound: Vec<Outbound> = removed
            .iter()
            .flat_map(|s| s.bound())
            .map(|(_, conn)| Outbound::new(conn, ServerEvent::Reset))
            .collect();
        self.connections.deliver(outbound).await;
        removed.len()
    }

    pub async fn session_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    /// Run `f` against the registry (holds the lock).
    #[cfg(test)]
    pub async fn with_registry<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SessionRegistry<E>) -> R,
    {
        let mut registry = self.registry.lock().await;
        f(&mut registry)
    }
}

fn route<E: PositionEngine>(
    registry: &mut SessionRegistry<E>,
    conn: ConnectionId,
    event: ClientEvent,
) -> Vec<Outbound> {
    match event {
        ClientEvent::NewGame(p) => {
            match registry.resolve_or_create(&p.student, &p.mentor, p.role, conn) {
                Ok((session, resolution)) => {
                    if resolution == Resolution::Existing {
                        debug!(session = %session.key(), conn = %conn, "newgame resumed session");
                    }
                    let color = session.color(p.role);
                    vec![Outbound::new(
                        conn,
                        ServerEvent::board_state(session.notation(), color),
                    )]
                }
                Err(e) => {
                    warn!(conn = %conn, error = %e, "newgame failed");
                    Vec::new()
                }
            }
        }

        ClientEvent::CreateSession(p) => create_session(registry, conn, p),
        ClientEvent::JoinSession(p) => join_session(registry, conn, p),

        ClientEvent::Move(p) => {
            let mv = MoveRequest {
                from: p.from,
                to: p.to,
                promotion: p.promotion,
            };
            match registry.find_by_connection(conn) {
                Some((session, _)) => {
                    session.touch();
                    coordinator::apply_move(session, &mv)
                }
                None => not_in_session(conn, "move"),
            }
        }

        ClientEvent::Undo => match registry.find_by_connection(conn) {
            Some((session, _)) => {
                session.touch();
                coordinator::undo(session)
            }
            None => not_in_session(conn, "undo"),
        },

        ClientEvent::SetState(p) => match registry.find_by_connection(conn) {
            Some((session, _)) => {
                session.touch();
                match coordinator::override_state(session, &p.state) {
                    Ok(out) => out,
                    Err(e) => {
                        warn!(conn = %conn, error = %e, "dropping setstate");
                        Vec::new()
                    }
                }
            }
            None => not_in_session(conn, "setstate"),
        },

        ClientEvent::EndGame(p) => {
            let key = registry
                .find_pairing(&p.student, &p.mentor)
                .map(|s| s.key().clone());
            match key {
                Some(key) => end_session(registry, &key),
                None => {
                    debug!(student = %p.student, mentor = %p.mentor, "endgame for unknown pairing");
                    Vec::new()
                }
            }
        }

        ClientEvent::EndSession(p) => {
            let key = SessionKey::Named(p.session_id);
            if registry.get(&key).is_none() {
                debug!(session = %key, "endSession for unknown session");
                return Vec::new();
            }
            end_session(registry, &key)
        }

        ClientEvent::Relay(ev) => match registry.find_by_connection(conn) {
            Some((session, sender)) => {
                session.touch();
                relay::forward(session, sender, ev).into_iter().collect()
            }
            None => not_in_session(conn, ev.name()),
        },
    }
}

fn create_session<E: PositionEngine>(
    registry: &mut SessionRegistry<E>,
    conn: ConnectionId,
    p: SessionRequestPayload,
) -> Vec<Outbound> {
    match registry.create_named(&p.session_id, &p.username, p.role, conn) {
        Ok(session) => {
            let color = session.color(p.role).unwrap_or_else(|| p.role.creator_color());
            vec![Outbound::new(
                conn,
                ServerEvent::SessionCreated(SessionStatePayload {
                    position: session.notation(),
                    color,
                }),
            )]
        }
        Err(e) => vec![error_reply(conn, &e)],
    }
}

fn join_session<E: PositionEngine>(
    registry: &mut SessionRegistry<E>,
    conn: ConnectionId,
    p: SessionRequestPayload,
) -> Vec<Outbound> {
    match registry.join_named(&p.session_id, &p.username, p.role, conn) {
        Ok(session) => {
            let color = session.color(p.role).unwrap_or_else(|| p.role.creator_color());
            let mut out = vec![Outbound::new(
                conn,
                ServerEvent::SessionJoined(SessionStatePayload {
                    position: session.notation(),
                    color,
                }),
            )];
            if session.is_full() {
                out.extend(coordinator::full_state(session));
            }
            out
        }
        Err(e) => vec![error_reply(conn, &e)],
    }
}

/// `reset` to both bound connections, then remove the session.
fn end_session<E: PositionEngine>(
    registry: &mut SessionRegistry<E>,
    key: &SessionKey,
) -> Vec<Outbound> {
    let out = registry
        .get(key)
        .map(|s| {
            s.bound()
                .into_iter()
                .map(|(_, conn)| Outbound::new(conn, ServerEvent::Reset))
                .collect()
        })
        .unwrap_or_default();
    registry.destroy(key);
    info!(session = %key, "session ended");
    out
}

fn error_reply(conn: ConnectionId, e: &ChessLinkError) -> Outbound {
    Outbound::new(conn, ServerEvent::error(e.to_string()))
}

fn not_in_session(conn: ConnectionId, event: &str) -> Vec<Outbound> {
    debug!(conn = %conn, event, "connection is not bound to a session");
    Vec::new()
}
