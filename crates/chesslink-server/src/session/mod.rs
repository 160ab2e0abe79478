//! Session management: pairing/named registry and the session entity.

pub mod registry;
pub mod state;

pub use registry::{MatchPolicy, Resolution, SessionRegistry};
pub use state::{ConnectionId, PairingKey, Participant, Session, SessionKey};
