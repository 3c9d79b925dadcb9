//! Read models returned by the project handlers.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::domain::foundation::{ProjectId, RunId};

/// One run inside a project summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    #[serde(rename = "runid")]
    pub run_id: RunId,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    pub metadata: Map<String, Value>,
    pub online: bool,
}

/// Project listing entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    #[serde(rename = "projectid")]
    pub project_id: ProjectId,
    /// Store size on disk, in bytes.
    pub storage: u64,
    pub online: bool,
    /// `name` from the newest run's `config` status, if any run set one.
    pub name: Option<Value>,
    #[serde(rename = "runids")]
    pub runs: Vec<RunSummary>,
}

/// Everything known about one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDetail {
    #[serde(rename = "runid")]
    pub run_id: RunId,
    pub online: bool,
    pub metadata: Map<String, Value>,
    /// `series -> latest value`.
    pub status: BTreeMap<String, Value>,
}

/// Image listing entry, without the blob.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMeta {
    #[serde(rename = "imageId")]
    pub image_id: i64,
    pub series: Option<String>,
    #[serde(rename = "runid")]
    pub run_id: Option<String>,
    pub timestamp: String,
    pub metadata: Value,
}
