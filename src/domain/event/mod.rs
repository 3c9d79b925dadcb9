//! Event model - the wire envelope and its vocabulary.

mod identity;
mod kind;
mod message;
mod query;

pub use identity::IdentityType;
pub use kind::EventKind;
pub use message::{EventMessage, RESULT_OK};
pub use query::{IdFilter, QueryCondition, SortColumn, SortDirection, TimestampFilter};
