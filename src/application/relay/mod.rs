//! Relay - connection handshake, identity binding and event dispatch.

mod connection_manager;
mod router;

pub use connection_manager::{Binding, ConnectionManager, ConnectionSession, SessionState};
pub use router::{EventRouter, Origin, Routed, HYPERPARAMS_SERIES};
