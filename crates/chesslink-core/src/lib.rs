//! chesslink-core: Shared protocol library for chesslink.
//!
//! Provides the JSON event messages exchanged between the server and the
//! mentor/student clients, the validated text codec, the error type, and the
//! position engine seam with its default chess implementation.

pub mod codec;
pub mod engine;
pub mod error;
pub mod messages;

// Re-export commonly used items at crate root.
pub use codec::{decode_client_event, encode_server_event};
pub use engine::{ChessPosition, MoveRequest, PositionEngine};
pub use error::{ChessLinkError, ChessLinkResult};
pub use messages::{ClientEvent, Color, RelayEvent, Role, ServerEvent};
