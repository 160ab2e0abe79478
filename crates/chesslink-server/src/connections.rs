//! Connection table and best-effort delivery.
//!
//! Each live transport connection registers an outbound queue here and gets a
//! [`ConnectionId`]. Sessions only ever store ids; delivering to an id that is
//! gone (or whose queue is full) is a silent drop.

use crate::session::ConnectionId;
use chesslink_core::ServerEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// An event addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: ConnectionId,
    pub event: ServerEvent,
}

impl Outbound {
    pub fn new(to: ConnectionId, event: ServerEvent) -> Self {
        Self { to, event }
    }
}

/// Outbound senders of every live connection.
pub struct ConnectionTable {
    senders: RwLock<HashMap<ConnectionId, mpsc::Sender<ServerEvent>>>,
    /// Monotonic connection ID counter.
    next_id: AtomicU64,
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a connection's outbound queue and assign it an id.
    pub async fn register(&self, tx: mpsc::Sender<ServerEvent>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.senders.write().await.insert(id, tx);
        debug!(conn = %id, "connection registered");
        id
    }

    pub async fn unregister(&self, id: ConnectionId) {
        if self.senders.write().await.remove(&id).is_some() {
            debug!(conn = %id, "connection unregistered");
        }
    }

    #[cfg(test)]
    pub async fn is_live(&self, id: ConnectionId) -> bool {
        self.senders
            .read()
            .await
            .get(&id)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Push `event` to `id` without waiting. Returns whether it was queued.
    pub async fn emit_to(&self, id: ConnectionId, event: ServerEvent) -> bool {
        let senders = self.senders.read().await;
        let Some(tx) = senders.get(&id) else {
            debug!(conn = %id, event = event.name(), "no live connection, dropping event");
            return false;
        };
        let name = event.name();
        match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(conn = %id, event = name, "outbound queue full, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn = %id, event = name, "connection closed, dropping event");
                false
            }
        }
    }

    /// Deliver a batch in order.
    pub async fn deliver(&self, batch: Vec<Outbound>) {
        for Outbound { to, event } in batch {
            self.emit_to(to, event).await;
        }
    }

    /// Number of live connections.
    pub async fn count(&self) -> usize {
        self.senders.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_assigns_distinct_ids() {
        let table = ConnectionTable::new();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        let a = table.register(tx1).await;
        let b = table.register(tx2).await;
        assert_ne!(a, b);
        assert_eq!(table.count().await, 2);
    }

    #[tokio::test]
    async fn emit_to_live_connection() {
        let table = ConnectionTable::new();
        let (tx, mut rx) = mpsc::channel(4);
        let id = table.register(tx).await;

        assert!(table.emit_to(id, ServerEvent::Reset).await);
        assert_eq!(rx.recv().await, Some(ServerEvent::Reset));
    }

    #[tokio::test]
    async fn emit_to_unknown_connection_is_noop() {
        let table = ConnectionTable::new();
        assert!(!table.emit_to(ConnectionId(99), ServerEvent::Reset).await);
    }

    #[tokio::test]
    async fn emit_after_unregister_is_noop() {
        let table = ConnectionTable::new();
        let (tx, mut rx) = mpsc::channel(4);
        let id = table.register(tx).await;
        table.unregister(id).await;

        assert!(!table.is_live(id).await);
        assert!(!table.emit_to(id, ServerEvent::Reset).await);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn emit_to_dropped_receiver_is_noop() {
        let table = ConnectionTable::new();
        let (tx, rx) = mpsc::channel(4);
        let id = table.register(tx).await;
        drop(rx);

        assert!(!table.is_live(id).await);
        assert!(!table.emit_to(id, ServerEvent::Reset).await);
    }

    #[tokio::test]
    async fn full_queue_drops_event() {
        let table = ConnectionTable::new();
        let (tx, mut rx) = mpsc::channel(1);
        let id = table.register(tx).await;

        assert!(table.emit_to(id, ServerEvent::Reset).await);
        assert!(!table.emit_to(id, ServerEvent::error("second")).await);
        assert_eq!(rx.recv().await, Some(ServerEvent::Reset));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn deliver_preserves_order() {
        let table = ConnectionTable::new();
        let (tx, mut rx) = mpsc::channel(4);
        let id = table.register(tx).await;

        table
            .deliver(vec![
                Outbound::new(id, ServerEvent::error("one")),
                Outbound::new(ConnectionId(42), ServerEvent::Reset),
                Outbound::new(id, ServerEvent::error("two")),
            ])
            .await;

        assert_eq!(rx.recv().await, Some(ServerEvent::error("one")));
        assert_eq!(rx.recv().await, Some(ServerEvent::error("two")));
    }
}
