//! HTTP routes for project endpoints.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use super::handlers::{
    delete_run, get_hardware, get_image, get_log, get_progress, get_project, get_run, get_scalar,
    list_images, list_projects, list_series, update_run, upload_image, ProjectHandlers,
};

/// Upload bodies may exceed axum's 2 MiB default.
const UPLOAD_BODY_LIMIT: usize = 64 * 1024 * 1024;

/// Creates the project router, to be nested under `/api/project`.
pub fn project_routes(handlers: ProjectHandlers) -> Router {
    Router::new()
        .route("/list", get(list_projects))
        .route("/:project_id", get(get_project))
        .route("/:project_id/log", get(get_log))
        .route("/:project_id/hardware", get(get_hardware))
        .route("/:project_id/scalar", get(get_scalar))
        .route("/:project_id/progress", get(get_progress))
        .route("/:project_id/series/:table", get(list_series))
        .route(
            "/:project_id/run/:run_id",
            get(get_run).put(update_run).delete(delete_run),
        )
        .route(
            "/:project_id/image",
            post(upload_image)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
                .get(list_images),
        )
        .route("/:project_id/image/:image_id", get(get_image))
        .with_state(handlers)
}
