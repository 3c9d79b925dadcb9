//! Adapters - Implementations of port interfaces and transport surfaces.
//!
//! - `sqlite` - per-project history stores
//! - `websocket` - relay endpoint
//! - `http` - read API and operational routes

pub mod http;
pub mod sqlite;
pub mod websocket;

pub use http::{build_app, ShutdownTrigger};
pub use sqlite::{SqliteHistoryStore, SqliteStoreFactory};
pub use websocket::WebSocketState;
