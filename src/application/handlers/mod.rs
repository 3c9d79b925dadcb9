//! Application handlers.
//!
//! Command and query handlers behind the HTTP read surface.

pub mod project;
