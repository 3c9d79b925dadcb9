//! GetProjectHandler / ListProjectsHandler - project summaries.

use std::sync::Arc;

use serde_json::Value;

use super::{resolve_bridge, ProjectError, ProjectSummary, RunSummary};
use crate::application::bridge::{Bridge, BridgeRegistry};
use crate::domain::foundation::ProjectId;

/// Status series whose `name` key names the project.
const CONFIG_SERIES: &str = "config";
const NAME_KEY: &str = "name";

/// Builds the summary of one bridge.
pub(super) async fn summarize(bridge: &Bridge) -> Result<ProjectSummary, ProjectError> {
    let store = bridge.store();
    let online_runs = bridge.online_runs().await;
    let runs = store.get_run_ids().await?;

    let mut name = None;
    for run in runs.iter().rev() {
        let mut status = store.get_status(Some(&run.run_id), Some(CONFIG_SERIES)).await?;
        let config = status
            .remove(run.run_id.as_str())
            .and_then(|mut by_series| by_series.remove(CONFIG_SERIES));
        if let Some(Value::Object(mut config)) = config {
            if let Some(found) = config.remove(NAME_KEY) {
                name = Some(found);
                break;
            }
        }
    }

    let runs = runs
        .into_iter()
        .map(|run| RunSummary {
            online: online_runs.contains(&run.run_id),
            run_id: run.run_id,
            created_at: run.created_at,
            metadata: run.metadata,
        })
        .collect();

    Ok(ProjectSummary {
        project_id: bridge.project_id().clone(),
        storage: store.size_bytes().await?,
        online: !online_runs.is_empty(),
        name,
        runs,
    })
}

#[derive(Debug, Clone)]
pub struct GetProjectQuery {
    pub project_id: ProjectId,
}

pub struct GetProjectHandler {
    registry: Arc<BridgeRegistry>,
}

impl GetProjectHandler {
    pub fn new(registry: Arc<BridgeRegistry>) -> Self {
        Self { registry }
    }

    pub async fn handle(&self, query: GetProjectQuery) -> Result<ProjectSummary, ProjectError> {
        let bridge = resolve_bridge(&self.registry, &query.project_id).await?;
        summarize(&bridge).await
    }
}

/// Lists every known project, live or historical.
pub struct ListProjectsHandler {
    registry: Arc<BridgeRegistry>,
}

impl ListProjectsHandler {
    pub fn new(registry: Arc<BridgeRegistry>) -> Self {
        Self { registry }
    }

    pub async fn handle(&self) -> Result<Vec<ProjectSummary>, ProjectError> {
        let mut summaries = Vec::new();
        for bridge in self.registry.all().await {
            summaries.push(summarize(&bridge).await?);
        }
        Ok(summaries)
    }
}
