//! Bridges - per-project routing between producers, consumers and history.

mod connection;
mod project;
mod registry;

pub use connection::{ConnectionHandle, SendError};
pub use project::Bridge;
pub use registry::BridgeRegistry;

use crate::domain::foundation::{ProjectId, RunId};
use crate::ports::StoreError;

/// Errors from bridge membership and lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("run id already connected: {0}")]
    RunAlreadyConnected(RunId),

    #[error("project has online runs: {0}")]
    ProjectOnline(ProjectId),

    #[error("project still has runs: {0}")]
    ProjectNotEmpty(ProjectId),

    /// The bridge was removed from the registry after the caller fetched it.
    #[error("project bridge was removed: {0}")]
    Retired(ProjectId),

    #[error(transparent)]
    Store(#[from] StoreError),
}
