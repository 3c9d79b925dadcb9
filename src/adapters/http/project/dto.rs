//! HTTP DTOs for project endpoints.

use serde::{Deserialize, Serialize};

use crate::application::handlers::project::DeleteRunResult;

// ════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════

/// `?condition=<json>` on history and image listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConditionParams {
    #[serde(default)]
    pub condition: Option<String>,
}

/// `?run_id=` on the series listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeriesParams {
    #[serde(default, alias = "runid")]
    pub run_id: Option<String>,
}

/// `?meta=true` returns image metadata instead of the image.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageParams {
    #[serde(default)]
    pub meta: Option<bool>,
}

// ════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct ResultResponse {
    pub result: &'static str,
}

impl From<DeleteRunResult> for ResultResponse {
    fn from(_: DeleteRunResult) -> Self {
        Self { result: "success" }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub result: &'static str,
    pub id: i64,
}

impl UploadResponse {
    pub fn ok(id: i64) -> Self {
        Self { result: "ok", id }
    }
}

/// Error body: `{"error": "<reason>"}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            error: reason.into(),
        }
    }
}
