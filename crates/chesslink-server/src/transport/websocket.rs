//! WebSocket listener using tokio-tungstenite.
//!
//! Each accepted connection carries one JSON event per text frame.

use futures_util::{SinkExt, StreamExt};
use chesslink_core::{ChessLinkError, ChessLinkResult};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// A handle to an accepted WebSocket connection.
pub struct WebSocketConnection {
    pub ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
    /// Remote address.
    pub remote_addr: SocketAddr,
}

/// Maximum text message size. Events are small; anything larger is not ours.
pub const MAX_WS_FRAME_SIZE: usize = 64 * 1024;

/// Handshake config: tungstenite enforces the size cap while reading, before
/// an oversized message is buffered.
fn ws_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(MAX_WS_FRAME_SIZE);
    config.max_frame_size = Some(MAX_WS_FRAME_SIZE);
    config
}

/// Start the WebSocket listener.
///
/// Returns the bound address (useful when binding port 0) and a receiver that
/// yields accepted connections.
pub async fn start_listener(
    bind_addr: SocketAddr,
) -> ChessLinkResult<(SocketAddr, mpsc::Receiver<WebSocketConnection>)> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| ChessLinkError::Transport(format!("WS bind failed: {e}")))?;
    let local_addr = tcp_listener.local_addr()?;

    info!(addr = %local_addr, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<WebSocketConnection>(64);

    tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        match tokio_tungstenite::accept_async_with_config(stream, Some(ws_config())).await {
                            Ok(ws_stream) => {
                                debug!(remote = %addr, "WebSocket connection accepted");
                                let conn = WebSocketConnection {
                                    ws_stream,
                                    remote_addr: addr,
                                };
                                if tx.send(conn).await.is_err() {
                                    warn!("WebSocket connection channel closed");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    });

    Ok((local_addr, rx))
}

/// Helper: send a text message over a WebSocket.
pub async fn ws_send_text(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
    text: String,
) -> ChessLinkResult<()> {
    ws.send(Message::Text(text.into()))
        .await
        .map_err(|e| ChessLinkError::Transport(format!("WS send failed: {e}")))
}

/// Helper: receive the next text message from a WebSocket.
///
/// Returns `None` if the connection is closed. Binary frames are ignored. A
/// message over [`MAX_WS_FRAME_SIZE`] fails the read with a transport error.
pub async fn ws_recv_text(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
) -> ChessLinkResult<Option<String>> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
            Some(Ok(Message::Close(_))) => return Ok(None),
            Some(Ok(Message::Ping(payload))) => {
                // Respond to pings automatically
                let _ = ws.send(Message::Pong(payload)).await;
            }
            Some(Ok(_)) => {
                // Ignore binary and other message types
                continue;
            }
            Some(Err(e)) => {
                return Err(ChessLinkError::Transport(format!("WS recv failed: {e}")));
            }
            None => return Ok(None),
        }
    }
}
