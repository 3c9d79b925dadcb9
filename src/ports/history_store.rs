//! HistoryStore port - per-project persistence of run history.
//!
//! One store per project id. A store holds:
//!
//! - the run-id directory (human run id to compact integer id, plus
//!   per-run metadata)
//! - append-only event tables, one per event type ever written
//! - blob tables for binary payloads (images)
//! - the status table, a latest-value map keyed by `(run, series)`
//!
//! Every operation is serialized per underlying file by the adapter, so
//! callers may share one handle across tasks freely.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::event::QueryCondition;
use crate::domain::foundation::{ProjectId, RunId};

/// Status projection: `run id -> series -> value`.
pub type StatusMap = BTreeMap<String, BTreeMap<String, Value>>;

/// Errors raised by history store operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// The file belongs to another project. Never merge.
    #[error("store project id mismatch: expected '{expected}', found '{found}'")]
    ProjectMismatch { expected: String, found: String },

    /// Schema version marker differs and strict checking is enabled.
    #[error("store version mismatch: expected '{expected}', found '{found}'")]
    VersionMismatch { expected: String, found: String },

    #[error("invalid table name: '{0}'")]
    InvalidTableName(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Addressing and retention for one write.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub series: Option<String>,
    pub run_id: Option<RunId>,
    /// Wire-format timestamp; the store stamps `now` when absent.
    pub timestamp: Option<String>,
    /// Keep at most this many rows for `(table, run, series)`.
    pub retention_limit: Option<u32>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn series(mut self, series: impl Into<String>) -> Self {
        self.series = Some(series.into());
        self
    }

    pub fn run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn retention_limit(mut self, limit: Option<u32>) -> Self {
        self.retention_limit = limit;
        self
    }
}

/// One row of an event table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRow {
    pub id: i64,
    pub timestamp: String,
    pub series: Option<String>,
    #[serde(rename = "runid")]
    pub run_id: Option<String>,
    pub json: Value,
}

/// One row of a blob table. `blob` is `None` for metadata-only reads.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobRow {
    pub id: i64,
    pub timestamp: String,
    pub series: Option<String>,
    pub run_id: Option<String>,
    pub metadata: Value,
    pub blob: Option<Vec<u8>>,
}

/// Entry of the run-id directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunInfo {
    #[serde(rename = "runid")]
    pub run_id: RunId,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    pub metadata: Map<String, Value>,
}

/// Port for one project's history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Project this store belongs to.
    fn project_id(&self) -> &ProjectId;

    /// Appends a JSON row, creating the table on first write, then trims
    /// to the retention limit. Returns the new row id.
    async fn write_event(
        &self,
        table: &str,
        payload: &Value,
        options: WriteOptions,
    ) -> Result<i64, StoreError>;

    /// Appends a blob row with JSON metadata. Same retention rules.
    async fn write_blob(
        &self,
        table: &str,
        metadata: &Value,
        blob: &[u8],
        options: WriteOptions,
    ) -> Result<i64, StoreError>;

    /// Reads rows matching the condition. A table never written is empty.
    async fn read_events(
        &self,
        table: &str,
        condition: &QueryCondition,
    ) -> Result<Vec<EventRow>, StoreError>;

    /// Reads blob rows. `meta_only` leaves `blob` unset.
    async fn read_blobs(
        &self,
        table: &str,
        condition: &QueryCondition,
        meta_only: bool,
    ) -> Result<Vec<BlobRow>, StoreError>;

    /// Upserts the status value for `(run_id, series)`.
    async fn set_status(
        &self,
        run_id: &RunId,
        series: &str,
        value: &Value,
    ) -> Result<i64, StoreError>;

    /// Status projection; `None` filters mean "all".
    async fn get_status(
        &self,
        run_id: Option<&RunId>,
        series: Option<&str>,
    ) -> Result<StatusMap, StoreError>;

    /// Every known run, oldest first.
    async fn get_run_ids(&self) -> Result<Vec<RunInfo>, StoreError>;

    /// Removes a run and every row referencing it. Returns whether it existed.
    async fn delete_run_id(&self, run_id: &RunId) -> Result<bool, StoreError>;

    /// Returns the run's metadata after merging `updates` key by key.
    /// Creates the run row if it does not exist yet.
    async fn fetch_or_create_metadata(
        &self,
        run_id: &RunId,
        updates: Option<Map<String, Value>>,
    ) -> Result<Map<String, Value>, StoreError>;

    /// Distinct series written to a table, optionally for one run.
    async fn series_of(
        &self,
        table: &str,
        run_id: Option<&RunId>,
    ) -> Result<Vec<String>, StoreError>;

    /// On-disk size in bytes.
    async fn size_bytes(&self) -> Result<u64, StoreError>;

    /// Closes the store and removes its files.
    async fn destroy(&self) -> Result<(), StoreError>;
}

/// Opens and discovers stores.
#[async_trait]
pub trait HistoryStoreFactory: Send + Sync {
    /// Opens (or creates) the store for a project.
    ///
    /// Fails with [`StoreError::ProjectMismatch`] if the file on disk
    /// carries another project's marker.
    async fn open(&self, project_id: &ProjectId) -> Result<Arc<dyn HistoryStore>, StoreError>;

    /// Project ids that already have a store on disk.
    async fn discover(&self) -> Result<Vec<ProjectId>, StoreError>;
}
