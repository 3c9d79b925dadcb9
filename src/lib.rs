//! Trackbridge - experiment-tracking relay.
//!
//! Sits between running programs (producers, one per run id) and dashboard
//! frontends (consumers, many per project). Events are relayed over
//! websocket connections and a subset is recorded into one SQLite history
//! file per project, which the HTTP read surface queries.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
