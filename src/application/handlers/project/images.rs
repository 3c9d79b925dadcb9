//! Image handlers: upload, fetch by id, metadata listing.
//!
//! Images live in the `image` blob table. The upload path is the only
//! writer; websocket `image` events are relayed but not stored.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::history::parse_condition;
use super::{resolve_bridge, ImageMeta, ProjectError};
use crate::application::bridge::BridgeRegistry;
use crate::domain::event::{EventMessage, QueryCondition};
use crate::domain::foundation::ProjectId;
use crate::ports::{BlobRow, WriteOptions};

pub const IMAGE_TABLE: &str = "image";

// ════════════════════════════════════════════════════════════════════════════
// Upload
// ════════════════════════════════════════════════════════════════════════════

/// Stores an image and announces it to the project's consumers.
///
/// `message` is the envelope sent alongside the image: its payload is the
/// image metadata and its series the image name.
#[derive(Debug, Clone)]
pub struct UploadImageCommand {
    pub project_id: ProjectId,
    pub message: EventMessage,
    pub image: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadImageResult {
    pub id: i64,
    pub delivered: usize,
}

pub struct UploadImageHandler {
    registry: Arc<BridgeRegistry>,
}

impl UploadImageHandler {
    pub fn new(registry: Arc<BridgeRegistry>) -> Self {
        Self { registry }
    }

    pub async fn handle(&self, cmd: UploadImageCommand) -> Result<UploadImageResult, ProjectError> {
        let bridge = resolve_bridge(&self.registry, &cmd.project_id).await?;
        if cmd.image.is_empty() {
            return Err(ProjectError::InvalidRequest("image is empty".to_string()));
        }

        let mut message = cmd.message;
        if message.payload.is_null() {
            message.payload = Value::Object(Map::new());
        }
        let options = WriteOptions {
            series: message.series.clone(),
            run_id: message.run_id.clone(),
            timestamp: Some(message.timestamp.clone()),
            retention_limit: message.retention_limit(),
        };
        let id = bridge
            .store()
            .write_blob(IMAGE_TABLE, &message.payload, &cmd.image, options)
            .await?;

        message.id = Some(id);
        message.project_id = Some(cmd.project_id.clone());
        let delivered = bridge.send_to_consumers(&message).await;
        tracing::debug!(
            project_id = %cmd.project_id,
            image_id = id,
            bytes = cmd.image.len(),
            delivered,
            "image stored"
        );
        Ok(UploadImageResult { id, delivered })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Fetch
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct FetchImageQuery {
    pub project_id: ProjectId,
    pub image_id: i64,
    /// Skip the blob and return only metadata.
    pub meta_only: bool,
}

pub struct FetchImageHandler {
    registry: Arc<BridgeRegistry>,
}

impl FetchImageHandler {
    pub fn new(registry: Arc<BridgeRegistry>) -> Self {
        Self { registry }
    }

    pub async fn handle(&self, query: FetchImageQuery) -> Result<BlobRow, ProjectError> {
        let bridge = resolve_bridge(&self.registry, &query.project_id).await?;
        let condition = QueryCondition::new().with_id(query.image_id);
        bridge
            .store()
            .read_blobs(IMAGE_TABLE, &condition, query.meta_only)
            .await?
            .into_iter()
            .next()
            .ok_or(ProjectError::ImageNotFound(query.image_id))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Listing
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ListImagesQuery {
    pub project_id: ProjectId,
    pub condition: Option<String>,
}

pub struct ListImagesHandler {
    registry: Arc<BridgeRegistry>,
}

impl ListImagesHandler {
    pub fn new(registry: Arc<BridgeRegistry>) -> Self {
        Self { registry }
    }

    pub async fn handle(&self, query: ListImagesQuery) -> Result<Vec<ImageMeta>, ProjectError> {
        let bridge = resolve_bridge(&self.registry, &query.project_id).await?;
        let condition = parse_condition(query.condition.as_deref())?;
        let rows = bridge
            .store()
            .read_blobs(IMAGE_TABLE, &condition, true)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| ImageMeta {
                image_id: row.id,
                series: row.series,
                run_id: row.run_id,
                timestamp: row.timestamp,
                metadata: row.metadata,
            })
            .collect())
    }
}
