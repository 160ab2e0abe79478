//! Core server: accepts WebSocket connections and runs one message loop per
//! connection.
//!
//! Owns the dispatcher (session registry + connection table) and coordinates
//! session GC and shutdown.

use crate::config::ServerConfig;
use crate::connections::ConnectionTable;
use crate::dispatch::Dispatcher;
use crate::session::{ConnectionId, SessionRegistry};
use crate::transport::websocket;
use chesslink_core::{encode_server_event, ChessLinkResult, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// The chesslink server instance.
pub struct ChessLinkServer {
    /// Server configuration.
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    /// Broadcast sender for server shutdown notification.
    shutdown_tx: broadcast::Sender<()>,
}

impl ChessLinkServer {
    /// Create a new server instance with an empty registry.
    pub fn new(config: ServerConfig) -> Self {
        let registry = SessionRegistry::with_limits(config.match_policy, config.max_sessions);
        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            Arc::new(ConnectionTable::new()),
        ));

        Self {
            config,
            dispatcher,
            shutdown_tx: broadcast::channel(1).0,
        }
    }

    /// Handle for signalling shutdown to every connection loop.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Bind the listener and accept connections until it closes.
    pub async fn run(self) -> ChessLinkResult<()> {
        let (local_addr, ws_rx) = websocket::start_listener(self.config.bind_addr()).await?;
        self.serve(local_addr, ws_rx).await
    }

    async fn serve(
        self,
        local_addr: SocketAddr,
        mut ws_rx: mpsc::Receiver<websocket::WebSocketConnection>,
    ) -> ChessLinkResult<()> {
        let server = Arc::new(self);

        // Session GC task
        let gc_dispatcher = server.dispatcher.clone();
        let gc_interval = server.config.gc_interval;
        let idle_timeout = server.config.idle_timeout;
        let mut gc_shutdown = server.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(gc_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let removed = gc_dispatcher.gc(idle_timeout).await;
                        let sessions = gc_dispatcher.session_count().await;
                        let connections = gc_dispatcher.connections().count().await;
                        if removed > 0 {
                            info!(removed, sessions, connections, "idle sessions collected");
                        } else {
                            debug!(sessions, connections, "gc sweep");
                        }
                    }
                    _ = gc_shutdown.recv() => break,
                }
            }
        });

        info!(
            addr = %local_addr,
            max_sessions = server.config.max_sessions,
            match_policy = ?server.config.match_policy,
            "chesslink-server ready"
        );

        let mut shutdown_rx = server.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                Some(ws_conn) = ws_rx.recv() => {
                    let srv = server.clone();
                    tokio::spawn(async move {
                        if let Err(e) = srv.handle_websocket(ws_conn).await {
                            warn!(error = %e, "WebSocket connection error");
                        }
                    });
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown requested, closing listener");
                    break;
                }
                else => {
                    info!("listener closed, shutting down");
                    break;
                }
            }
        }

        // Make sure every connection loop sees the shutdown.
        let _ = server.shutdown_tx.send(());
        Ok(())
    }

    /// Register a WebSocket connection and run its message loop.
    async fn handle_websocket(
        &self,
        mut conn: websocket::WebSocketConnection,
    ) -> ChessLinkResult<()> {
        let remote = conn.remote_addr;
        let (tx, rx) = mpsc::channel::<ServerEvent>(self.config.outbound_queue);
        let conn_id = self.dispatcher.connections().register(tx).await;
        info!(remote = %remote, conn = %conn_id, "connection opened");

        let result = self.connection_loop(&mut conn, conn_id, rx).await;

        self.dispatcher.connections().unregister(conn_id).await;
        info!(remote = %remote, conn = %conn_id, "connection closed");
        result
    }

    /// Message loop over one WebSocket.
    async fn connection_loop(
        &self,
        conn: &mut websocket::WebSocketConnection,
        conn_id: ConnectionId,
        mut outbound_rx: mpsc::Receiver<ServerEvent>,
    ) -> ChessLinkResult<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!(conn = %conn_id, "shutdown signal received, closing connection");
                    let _ = conn.ws_stream.close(None).await;
                    break;
                }

                Some(event) = outbound_rx.recv() => {
                    match encode_server_event(&event) {
                        Ok(text) => websocket::ws_send_text(&mut conn.ws_stream, text).await?,
                        Err(e) => warn!(conn = %conn_id, error = %e, "failed to encode event"),
                    }
                }

                ws_result = websocket::ws_recv_text(&mut conn.ws_stream) => {
                    match ws_result {
                        Ok(Some(text)) => {
                            self.dispatcher.handle_frame(conn_id, &text).await;
                        }
                        Ok(None) => {
                            debug!(conn = %conn_id, "WebSocket session ended (peer closed)");
                            break;
                        }
                        Err(e) => {
                            debug!(conn = %conn_id, error = %e, "WebSocket session ended");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
