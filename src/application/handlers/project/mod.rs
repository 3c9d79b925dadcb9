//! Project read and command handlers behind the HTTP surface.

mod error;
mod get_project;
mod history;
mod images;
mod run;
mod views;

pub use error::ProjectError;
pub use get_project::{GetProjectHandler, GetProjectQuery, ListProjectsHandler};
pub use history::{
    HistoryTable, ListSeriesHandler, ListSeriesQuery, QueryHistoryHandler, QueryHistoryQuery,
};
pub use images::{
    FetchImageHandler, FetchImageQuery, ListImagesHandler, ListImagesQuery, UploadImageCommand,
    UploadImageHandler, UploadImageResult, IMAGE_TABLE,
};
pub use run::{
    DeleteRunCommand, DeleteRunHandler, DeleteRunResult, GetRunHandler, GetRunQuery,
    UpdateRunMetadataCommand, UpdateRunMetadataHandler,
};
pub use views::{ImageMeta, ProjectSummary, RunDetail, RunSummary};

use std::sync::Arc;

use crate::application::bridge::{Bridge, BridgeRegistry};
use crate::domain::foundation::ProjectId;

async fn resolve_bridge(
    registry: &BridgeRegistry,
    project_id: &ProjectId,
) -> Result<Arc<Bridge>, ProjectError> {
    registry
        .get(project_id)
        .await
        .ok_or_else(|| ProjectError::ProjectNotFound(project_id.to_string()))
}
