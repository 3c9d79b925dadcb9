//! Application layer - relay, bridges, and read/command handlers.
//!
//! - `bridge` - per-project routing units and their registry
//! - `relay` - connection handshake, identity binding, event dispatch
//! - `handlers` - queries and commands behind the HTTP surface

pub mod bridge;
pub mod handlers;
pub mod relay;

pub use bridge::{Bridge, BridgeError, BridgeRegistry, ConnectionHandle};
pub use relay::{ConnectionManager, ConnectionSession, EventRouter};
