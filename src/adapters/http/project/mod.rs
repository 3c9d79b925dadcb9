//! HTTP adapter for project endpoints.

mod dto;
mod handlers;
mod routes;

pub use dto::{ErrorResponse, ResultResponse, UploadResponse};
pub use handlers::{handle_project_error, ProjectHandlers};
pub use routes::project_routes;
