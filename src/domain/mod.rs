//! Domain layer - value objects and the event model.
//!
//! - `foundation` - identifiers, timestamps, error types
//! - `event` - wire envelope, identity and event kinds, query conditions

pub mod event;
pub mod foundation;
