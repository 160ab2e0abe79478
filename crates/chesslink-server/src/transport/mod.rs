//! Transport listeners.

pub mod websocket;
