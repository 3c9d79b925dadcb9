//! HTTP handlers for project endpoints.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};

use crate::application::bridge::BridgeRegistry;
use crate::application::handlers::project::{
    DeleteRunCommand, DeleteRunHandler, FetchImageHandler, FetchImageQuery, GetProjectHandler,
    GetProjectQuery, GetRunHandler, GetRunQuery, HistoryTable, ListImagesHandler,
    ListImagesQuery, ListProjectsHandler, ListSeriesHandler, ListSeriesQuery, ProjectError,
    QueryHistoryHandler, QueryHistoryQuery, UpdateRunMetadataCommand, UpdateRunMetadataHandler,
    UploadImageCommand, UploadImageHandler,
};
use crate::domain::event::EventMessage;
use crate::domain::foundation::{DomainError, ProjectId, RunId};

use super::dto::{
    ConditionParams, ErrorResponse, ImageParams, ResultResponse, SeriesParams, UploadResponse,
};

// ════════════════════════════════════════════════════════════════════════════
// Handler state
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct ProjectHandlers {
    list_handler: Arc<ListProjectsHandler>,
    get_handler: Arc<GetProjectHandler>,
    history_handler: Arc<QueryHistoryHandler>,
    series_handler: Arc<ListSeriesHandler>,
    get_run_handler: Arc<GetRunHandler>,
    update_run_handler: Arc<UpdateRunMetadataHandler>,
    delete_run_handler: Arc<DeleteRunHandler>,
    upload_image_handler: Arc<UploadImageHandler>,
    fetch_image_handler: Arc<FetchImageHandler>,
    list_images_handler: Arc<ListImagesHandler>,
}

impl ProjectHandlers {
    /// Builds every handler over one shared registry.
    pub fn new(registry: Arc<BridgeRegistry>) -> Self {
        Self {
            list_handler: Arc::new(ListProjectsHandler::new(Arc::clone(&registry))),
            get_handler: Arc::new(GetProjectHandler::new(Arc::clone(&registry))),
            history_handler: Arc::new(QueryHistoryHandler::new(Arc::clone(&registry))),
            series_handler: Arc::new(ListSeriesHandler::new(Arc::clone(&registry))),
            get_run_handler: Arc::new(GetRunHandler::new(Arc::clone(&registry))),
            update_run_handler: Arc::new(UpdateRunMetadataHandler::new(Arc::clone(&registry))),
            delete_run_handler: Arc::new(DeleteRunHandler::new(Arc::clone(&registry))),
            upload_image_handler: Arc::new(UploadImageHandler::new(Arc::clone(&registry))),
            fetch_image_handler: Arc::new(FetchImageHandler::new(Arc::clone(&registry))),
            list_images_handler: Arc::new(ListImagesHandler::new(registry)),
        }
    }
}

// An id that fails validation cannot name a stored project or run.
fn project_id(raw: &str) -> Result<ProjectId, ProjectError> {
    ProjectId::new(raw).map_err(|_| ProjectError::ProjectNotFound(raw.to_string()))
}

fn run_id(raw: &str) -> Result<RunId, ProjectError> {
    RunId::new(raw).map_err(|_| ProjectError::RunNotFound(raw.to_string()))
}

// ════════════════════════════════════════════════════════════════════════════
// Projects
// ════════════════════════════════════════════════════════════════════════════

/// GET /api/project/list - Every known project
pub async fn list_projects(State(handlers): State<ProjectHandlers>) -> Response {
    match handlers.list_handler.handle().await {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(e) => handle_project_error(e),
    }
}

/// GET /api/project/:project_id - One project's summary
pub async fn get_project(
    State(handlers): State<ProjectHandlers>,
    Path(raw_project): Path<String>,
) -> Response {
    let result = async {
        let query = GetProjectQuery {
            project_id: project_id(&raw_project)?,
        };
        handlers.get_handler.handle(query).await
    }
    .await;

    match result {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => handle_project_error(e),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// History
// ════════════════════════════════════════════════════════════════════════════

async fn query_history(
    handlers: &ProjectHandlers,
    raw_project: &str,
    table: HistoryTable,
    params: ConditionParams,
) -> Response {
    let result = async {
        let query = QueryHistoryQuery {
            project_id: project_id(raw_project)?,
            table,
            condition: params.condition,
        };
        handlers.history_handler.handle(query).await
    }
    .await;

    match result {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => handle_project_error(e),
    }
}

/// GET /api/project/:project_id/log
pub async fn get_log(
    State(handlers): State<ProjectHandlers>,
    Path(raw_project): Path<String>,
    Query(params): Query<ConditionParams>,
) -> Response {
    query_history(&handlers, &raw_project, HistoryTable::Log, params).await
}

/// GET /api/project/:project_id/hardware
pub async fn get_hardware(
    State(handlers): State<ProjectHandlers>,
    Path(raw_project): Path<String>,
    Query(params): Query<ConditionParams>,
) -> Response {
    query_history(&handlers, &raw_project, HistoryTable::Hardware, params).await
}

/// GET /api/project/:project_id/scalar
pub async fn get_scalar(
    State(handlers): State<ProjectHandlers>,
    Path(raw_project): Path<String>,
    Query(params): Query<ConditionParams>,
) -> Response {
    query_history(&handlers, &raw_project, HistoryTable::Scalar, params).await
}

/// GET /api/project/:project_id/progress
pub async fn get_progress(
    State(handlers): State<ProjectHandlers>,
    Path(raw_project): Path<String>,
    Query(params): Query<ConditionParams>,
) -> Response {
    query_history(&handlers, &raw_project, HistoryTable::Progress, params).await
}

/// GET /api/project/:project_id/series/:table - Distinct series of a table
pub async fn list_series(
    State(handlers): State<ProjectHandlers>,
    Path((raw_project, table)): Path<(String, String)>,
    Query(params): Query<SeriesParams>,
) -> Response {
    let result = async {
        let query = ListSeriesQuery {
            project_id: project_id(&raw_project)?,
            table,
            run_id: params.run_id.as_deref().map(run_id).transpose()?,
        };
        handlers.series_handler.handle(query).await
    }
    .await;

    match result {
        Ok(series) => (StatusCode::OK, Json(series)).into_response(),
        Err(e) => handle_project_error(e),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Runs
// ════════════════════════════════════════════════════════════════════════════

/// GET /api/project/:project_id/run/:run_id - Run metadata, status and presence
pub async fn get_run(
    State(handlers): State<ProjectHandlers>,
    Path((raw_project, raw_run)): Path<(String, String)>,
) -> Response {
    let result = async {
        let query = GetRunQuery {
            project_id: project_id(&raw_project)?,
            run_id: run_id(&raw_run)?,
        };
        handlers.get_run_handler.handle(query).await
    }
    .await;

    match result {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => handle_project_error(e),
    }
}

/// PUT /api/project/:project_id/run/:run_id - Merge into run metadata
pub async fn update_run(
    State(handlers): State<ProjectHandlers>,
    Path((raw_project, raw_run)): Path<(String, String)>,
    Json(updates): Json<Map<String, Value>>,
) -> Response {
    let result = async {
        let cmd = UpdateRunMetadataCommand {
            project_id: project_id(&raw_project)?,
            run_id: run_id(&raw_run)?,
            updates,
        };
        handlers.update_run_handler.handle(cmd).await
    }
    .await;

    match result {
        Ok(metadata) => (StatusCode::OK, Json(metadata)).into_response(),
        Err(e) => handle_project_error(e),
    }
}

/// DELETE /api/project/:project_id/run/:run_id - Delete a historical run
pub async fn delete_run(
    State(handlers): State<ProjectHandlers>,
    Path((raw_project, raw_run)): Path<(String, String)>,
) -> Response {
    let result = async {
        let cmd = DeleteRunCommand {
            project_id: project_id(&raw_project)?,
            run_id: run_id(&raw_run)?,
        };
        handlers.delete_run_handler.handle(cmd).await
    }
    .await;

    match result {
        Ok(outcome) => (StatusCode::OK, Json(ResultResponse::from(outcome))).into_response(),
        Err(e) => handle_project_error(e),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Images
// ════════════════════════════════════════════════════════════════════════════

/// Reads the `metadata` (envelope JSON) and `image` (bytes) parts.
async fn read_upload(mut multipart: Multipart) -> Result<(EventMessage, Vec<u8>), ProjectError> {
    let mut message = None;
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ProjectError::InvalidRequest(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("metadata") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ProjectError::InvalidRequest(e.to_string()))?;
                message = Some(EventMessage::parse(&text)?);
            }
            Some("image") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ProjectError::InvalidRequest(e.to_string()))?;
                image = Some(bytes.to_vec());
            }
            other => {
                tracing::debug!(field = ?other, "unexpected multipart field ignored");
            }
        }
    }

    let message =
        message.ok_or_else(|| ProjectError::InvalidRequest("missing metadata part".into()))?;
    let image = image.ok_or_else(|| ProjectError::InvalidRequest("missing image part".into()))?;
    Ok((message, image))
}

/// POST /api/project/:project_id/image - Store an image and notify consumers
pub async fn upload_image(
    State(handlers): State<ProjectHandlers>,
    Path(raw_project): Path<String>,
    multipart: Multipart,
) -> Response {
    let result = async {
        let project_id = project_id(&raw_project)?;
        let (message, image) = read_upload(multipart).await?;
        let cmd = UploadImageCommand {
            project_id,
            message,
            image,
        };
        handlers.upload_image_handler.handle(cmd).await
    }
    .await;

    match result {
        Ok(uploaded) => (StatusCode::OK, Json(UploadResponse::ok(uploaded.id))).into_response(),
        Err(e) => handle_project_error(e),
    }
}

/// GET /api/project/:project_id/image/:image_id - The image, or its metadata with `?meta=true`
pub async fn get_image(
    State(handlers): State<ProjectHandlers>,
    Path((raw_project, image_id)): Path<(String, i64)>,
    Query(params): Query<ImageParams>,
) -> Response {
    let meta_only = params.meta.unwrap_or(false);
    let result = async {
        let query = FetchImageQuery {
            project_id: project_id(&raw_project)?,
            image_id,
            meta_only,
        };
        handlers.fetch_image_handler.handle(query).await
    }
    .await;

    match result {
        Ok(row) if meta_only => (StatusCode::OK, Json(row.metadata)).into_response(),
        Ok(row) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "image/png")],
            row.blob.unwrap_or_default(),
        )
            .into_response(),
        Err(e) => handle_project_error(e),
    }
}

/// GET /api/project/:project_id/image - Image metadata listing
pub async fn list_images(
    State(handlers): State<ProjectHandlers>,
    Path(raw_project): Path<String>,
    Query(params): Query<ConditionParams>,
) -> Response {
    let result = async {
        let query = ListImagesQuery {
            project_id: project_id(&raw_project)?,
            condition: params.condition,
        };
        handlers.list_images_handler.handle(query).await
    }
    .await;

    match result {
        Ok(images) => (StatusCode::OK, Json(images)).into_response(),
        Err(e) => handle_project_error(e),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Error handling
// ════════════════════════════════════════════════════════════════════════════

pub fn handle_project_error(error: ProjectError) -> Response {
    let error = DomainError::from(error);
    let status =
        StatusCode::from_u16(error.code.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(code = %error.code, error = %error.message, "project request failed");
    } else {
        tracing::debug!(code = %error.code, error = %error.message, "project request rejected");
    }
    (status, Json(ErrorResponse::new(error.message))).into_response()
}
