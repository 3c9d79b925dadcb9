//! Run-level handlers: detail, metadata update, deletion.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::{resolve_bridge, ProjectError, RunDetail};
use crate::application::bridge::{Bridge, BridgeError, BridgeRegistry};
use crate::domain::foundation::{ProjectId, RunId};

async fn ensure_run_exists(bridge: &Bridge, run_id: &RunId) -> Result<(), ProjectError> {
    let known = bridge
        .store()
        .get_run_ids()
        .await?
        .iter()
        .any(|run| &run.run_id == run_id);
    if known {
        Ok(())
    } else {
        Err(ProjectError::RunNotFound(run_id.to_string()))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Detail
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct GetRunQuery {
    pub project_id: ProjectId,
    pub run_id: RunId,
}

pub struct GetRunHandler {
    registry: Arc<BridgeRegistry>,
}

impl GetRunHandler {
    pub fn new(registry: Arc<BridgeRegistry>) -> Self {
        Self { registry }
    }

    pub async fn handle(&self, query: GetRunQuery) -> Result<RunDetail, ProjectError> {
        let bridge = resolve_bridge(&self.registry, &query.project_id).await?;
        ensure_run_exists(&bridge, &query.run_id).await?;

        let store = bridge.store();
        let metadata = store.fetch_or_create_metadata(&query.run_id, None).await?;
        let status = store
            .get_status(Some(&query.run_id), None)
            .await?
            .remove(query.run_id.as_str())
            .unwrap_or_default();

        Ok(RunDetail {
            online: bridge.is_online(&query.run_id).await,
            run_id: query.run_id,
            metadata,
            status,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Metadata update
// ════════════════════════════════════════════════════════════════════════════

/// Merges `updates` into a run's metadata, key by key.
#[derive(Debug, Clone)]
pub struct UpdateRunMetadataCommand {
    pub project_id: ProjectId,
    pub run_id: RunId,
    pub updates: Map<String, Value>,
}

pub struct UpdateRunMetadataHandler {
    registry: Arc<BridgeRegistry>,
}

impl UpdateRunMetadataHandler {
    pub fn new(registry: Arc<BridgeRegistry>) -> Self {
        Self { registry }
    }

    pub async fn handle(
        &self,
        cmd: UpdateRunMetadataCommand,
    ) -> Result<Map<String, Value>, ProjectError> {
        let bridge = resolve_bridge(&self.registry, &cmd.project_id).await?;
        ensure_run_exists(&bridge, &cmd.run_id).await?;

        let metadata = bridge
            .store()
            .fetch_or_create_metadata(&cmd.run_id, Some(cmd.updates))
            .await?;
        tracing::debug!(project_id = %cmd.project_id, run_id = %cmd.run_id, "run metadata updated");
        Ok(metadata)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Deletion
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct DeleteRunCommand {
    pub project_id: ProjectId,
    pub run_id: RunId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRunResult {
    /// The run was the project's last one and the project store is gone.
    pub project_removed: bool,
}

pub struct DeleteRunHandler {
    registry: Arc<BridgeRegistry>,
}

impl DeleteRunHandler {
    pub fn new(registry: Arc<BridgeRegistry>) -> Self {
        Self { registry }
    }

    /// Deletes a historical run. Refused while the run is online.
    pub async fn handle(&self, cmd: DeleteRunCommand) -> Result<DeleteRunResult, ProjectError> {
        let bridge = resolve_bridge(&self.registry, &cmd.project_id).await?;
        if !bridge.delete_run(&cmd.run_id).await? {
            return Err(ProjectError::RunNotFound(cmd.run_id.to_string()));
        }

        if !bridge.store().get_run_ids().await?.is_empty() {
            return Ok(DeleteRunResult {
                project_removed: false,
            });
        }

        match self.registry.delete(&cmd.project_id).await {
            Ok(()) => Ok(DeleteRunResult {
                project_removed: true,
            }),
            // Someone reconnected or wrote meanwhile; keep the project.
            Err(BridgeError::ProjectOnline(_)) | Err(BridgeError::ProjectNotEmpty(_)) => {
                Ok(DeleteRunResult {
                    project_removed: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
