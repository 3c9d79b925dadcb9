//! Directory of live bridges, one per project id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{Bridge, BridgeError};
use crate::domain::foundation::ProjectId;
use crate::ports::HistoryStoreFactory;

/// Owns every [`Bridge`] in the process.
///
/// Constructed once at startup and shared by the relay and the HTTP
/// surface. Structural changes take the map's write lock; everything else
/// works on cloned `Arc<Bridge>`s.
pub struct BridgeRegistry {
    factory: Arc<dyn HistoryStoreFactory>,
    bridges: RwLock<HashMap<ProjectId, Arc<Bridge>>>,
}

impl BridgeRegistry {
    pub fn new(factory: Arc<dyn HistoryStoreFactory>) -> Self {
        Self {
            factory,
            bridges: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the project's bridge, opening its store if needed.
    pub async fn get_or_create(&self, project_id: &ProjectId) -> Result<Arc<Bridge>, BridgeError> {
        if let Some(bridge) = self.get(project_id).await {
            return Ok(bridge);
        }

        let mut bridges = self.bridges.write().await;
        // Another task may have won the race while we waited for the lock.
        if let Some(bridge) = bridges.get(project_id) {
            return Ok(Arc::clone(bridge));
        }

        let store = self.factory.open(project_id).await?;
        let bridge = Arc::new(Bridge::new(project_id.clone(), store));
        bridges.insert(project_id.clone(), Arc::clone(&bridge));
        tracing::info!(project_id = %project_id, "bridge created");
        Ok(bridge)
    }

    pub async fn get(&self, project_id: &ProjectId) -> Option<Arc<Bridge>> {
        self.bridges.read().await.get(project_id).cloned()
    }

    pub async fn has(&self, project_id: &ProjectId) -> bool {
        self.bridges.read().await.contains_key(project_id)
    }

    /// Every bridge, ordered by project id.
    pub async fn all(&self) -> Vec<Arc<Bridge>> {
        let mut all: Vec<_> = self.bridges.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.project_id().cmp(b.project_id()));
        all
    }

    /// Drops a project's bridge and removes its store from disk.
    ///
    /// Refused while any producer is online or any run remains.
    pub async fn delete(&self, project_id: &ProjectId) -> Result<(), BridgeError> {
        let mut bridges = self.bridges.write().await;
        let Some(bridge) = bridges.get(project_id).cloned() else {
            return Ok(());
        };

        if !bridge.store().get_run_ids().await?.is_empty() {
            return Err(BridgeError::ProjectNotEmpty(project_id.clone()));
        }
        bridge.retire().await?;
        bridges.remove(project_id);
        drop(bridges);

        bridge.store().destroy().await?;
        tracing::info!(project_id = %project_id, "bridge deleted");
        Ok(())
    }

    /// Materializes a store-only bridge for every store on disk.
    ///
    /// A store whose embedded project id disagrees with its file name
    /// fails the whole load.
    pub async fn load_existing(&self) -> Result<usize, BridgeError> {
        let discovered = self.factory.discover().await?;
        let count = discovered.len();
        for project_id in discovered {
            self.get_or_create(&project_id).await?;
        }
        tracing::info!(count, "historical projects loaded");
        Ok(count)
    }
}
