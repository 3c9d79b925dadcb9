//! WebSocket adapter for the relay endpoint.
//!
//! ```text
//!   socket ──text──▶ ConnectionSession ──▶ EventRouter ──▶ Bridge ──▶ peers
//!     ▲                                                                 │
//!     └──────────────── outbound queue (mpsc) ◀─────────────────────────┘
//! ```
//!
//! - [`messages`] - frame codec
//! - [`handler`] - axum upgrade handler and per-connection loop

pub mod handler;
pub mod messages;

pub use handler::{websocket_router, ws_handler, WebSocketState};
pub use messages::{decode, encode, Inbound};
