//! HTTP adapters - the read API and operational endpoints.

pub mod project;
pub mod server;

pub use project::{handle_project_error, project_routes, ProjectHandlers};
pub use server::{server_routes, wait_for_shutdown, ShutdownTrigger};

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::adapters::websocket::{websocket_router, WebSocketState};
use crate::application::bridge::BridgeRegistry;

/// Assembles every route of the process into one router.
pub fn build_app(
    registry: Arc<BridgeRegistry>,
    websocket: WebSocketState,
    shutdown: ShutdownTrigger,
    cors_origins: &[String],
) -> Router {
    Router::new()
        .nest("/api/project", project_routes(ProjectHandlers::new(registry)))
        .merge(websocket_router(websocket))
        .merge(server_routes(shutdown))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// No configured origins means any origin may call the read API.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
