use thiserror::Error;

use crate::messages::Role;

/// Errors produced by the chesslink protocol and session layers.
#[derive(Debug, Error)]
pub enum ChessLinkError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session already exists: {0}")]
    SessionExists(String),

    #[error("role {role} is already taken in session {session}")]
    RoleTaken { session: String, role: Role },

    #[error("max sessions ({0}) reached")]
    Capacity(usize),

    #[error("invalid position: {0}")]
    Position(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ChessLinkError {
    fn from(e: serde_json::Error) -> Self {
        ChessLinkError::Codec(e.to_string())
    }
}

pub type ChessLinkResult<T> = Result<T, ChessLinkError>;
