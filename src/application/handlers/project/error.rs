//! Errors of the project read/command handlers.

use crate::application::bridge::BridgeError;
use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};
use crate::ports::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("project id not found: {0}")]
    ProjectNotFound(String),

    #[error("run id not found: {0}")]
    RunNotFound(String),

    #[error("image not found: {0}")]
    ImageNotFound(i64),

    #[error("can only delete history run id, {0} is online")]
    RunOnline(String),

    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProjectError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ProjectError::ProjectNotFound(_) => ErrorCode::ProjectNotFound,
            ProjectError::RunNotFound(_) => ErrorCode::RunNotFound,
            ProjectError::ImageNotFound(_) => ErrorCode::ImageNotFound,
            ProjectError::RunOnline(_) => ErrorCode::RunOnline,
            ProjectError::InvalidCondition(_) | ProjectError::InvalidRequest(_) => {
                ErrorCode::ValidationFailed
            }
            ProjectError::Store(_) => ErrorCode::DatabaseError,
        }
    }
}

impl From<BridgeError> for ProjectError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Store(e) => ProjectError::Store(e),
            BridgeError::RunAlreadyConnected(run) => ProjectError::RunOnline(run.to_string()),
            BridgeError::ProjectOnline(project)
            | BridgeError::ProjectNotEmpty(project)
            | BridgeError::Retired(project) => {
                ProjectError::InvalidRequest(format!("project {} cannot be removed", project))
            }
        }
    }
}

impl From<ValidationError> for ProjectError {
    fn from(err: ValidationError) -> Self {
        ProjectError::InvalidRequest(err.to_string())
    }
}

impl From<ProjectError> for DomainError {
    fn from(err: ProjectError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}
