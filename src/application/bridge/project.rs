//! Per-project routing unit.
//!
//! ```text
//! Bridge: project-a
//! ├── producers: run-1 -> conn, run-2 -> conn
//! ├── consumers: [conn, conn]
//! └── store: project-a.projectdb
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::connection::ConnectionHandle;
use super::BridgeError;
use crate::domain::event::EventMessage;
use crate::domain::foundation::{ConnectionId, ProjectId, RunId};
use crate::ports::HistoryStore;

#[derive(Default)]
struct Peers {
    producers: HashMap<RunId, ConnectionHandle>,
    consumers: Vec<ConnectionHandle>,
    /// `(run, event id)` of actions awaiting a producer reply, and who asked.
    pending_actions: HashMap<(RunId, i64), ConnectionId>,
    /// Set once the registry dropped this bridge; no producer may join.
    retired: bool,
}

/// Connects the producers and consumers of one project to its store.
///
/// One lock guards all peer bookkeeping. Sends happen under the read
/// lock and never wait on a socket.
pub struct Bridge {
    project_id: ProjectId,
    store: Arc<dyn HistoryStore>,
    peers: RwLock<Peers>,
}

impl Bridge {
    pub fn new(project_id: ProjectId, store: Arc<dyn HistoryStore>) -> Self {
        Self {
            project_id,
            store,
            peers: RwLock::new(Peers::default()),
        }
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    // ════════════════════════════════════════════════════════════════════
    // Membership
    // ════════════════════════════════════════════════════════════════════

    /// Binds `handle` as the producer of `run_id`.
    ///
    /// A run has at most one live producer. An entry whose transport has
    /// already gone away is replaced.
    pub async fn attach_producer(
        &self,
        run_id: RunId,
        handle: ConnectionHandle,
    ) -> Result<(), BridgeError> {
        let mut peers = self.peers.write().await;
        if peers.retired {
            return Err(BridgeError::Retired(self.project_id.clone()));
        }
        if let Some(existing) = peers.producers.get(&run_id) {
            if !existing.is_closed() {
                return Err(BridgeError::RunAlreadyConnected(run_id));
            }
            tracing::debug!(
                project_id = %self.project_id,
                run_id = %run_id,
                stale = %existing.id(),
                "replacing stale producer"
            );
        }
        peers.producers.insert(run_id, handle);
        Ok(())
    }

    /// Unbinds the producer of `run_id` if it is still `connection`.
    pub async fn detach_producer(&self, run_id: &RunId, connection: ConnectionId) -> bool {
        let mut peers = self.peers.write().await;
        let owned = peers
            .producers
            .get(run_id)
            .is_some_and(|h| h.id() == connection);
        if owned {
            peers.producers.remove(run_id);
            peers.pending_actions.retain(|(run, _), _| run != run_id);
        }
        owned
    }

    pub async fn attach_consumer(&self, handle: ConnectionHandle) {
        self.peers.write().await.consumers.push(handle);
    }

    pub async fn detach_consumer(&self, connection: ConnectionId) -> bool {
        let mut peers = self.peers.write().await;
        let before = peers.consumers.len();
        peers.consumers.retain(|h| h.id() != connection);
        peers.pending_actions.retain(|_, asker| *asker != connection);
        peers.consumers.len() != before
    }

    /// Deletes a run's history unless it has a live producer.
    ///
    /// The peer lock is held across the store delete, so a producer
    /// handshake for the run waits until the rows are gone. Returns whether
    /// the run existed.
    pub async fn delete_run(&self, run_id: &RunId) -> Result<bool, BridgeError> {
        let peers = self.peers.write().await;
        if peers.producers.get(run_id).is_some_and(|h| !h.is_closed()) {
            return Err(BridgeError::RunAlreadyConnected(run_id.clone()));
        }
        let existed = self.store.delete_run_id(run_id).await?;
        drop(peers);
        if existed {
            tracing::info!(project_id = %self.project_id, run_id = %run_id, "run deleted");
        }
        Ok(existed)
    }

    /// Marks the bridge dropped unless a producer is online.
    pub(super) async fn retire(&self) -> Result<(), BridgeError> {
        let mut peers = self.peers.write().await;
        if !peers.producers.is_empty() {
            return Err(BridgeError::ProjectOnline(self.project_id.clone()));
        }
        peers.retired = true;
        Ok(())
    }

    // ════════════════════════════════════════════════════════════════════
    // Presence
    // ════════════════════════════════════════════════════════════════════

    pub async fn is_online(&self, run_id: &RunId) -> bool {
        self.peers
            .read()
            .await
            .producers
            .get(run_id)
            .is_some_and(|h| !h.is_closed())
    }

    pub async fn online_runs(&self) -> HashSet<RunId> {
        self.peers
            .read()
            .await
            .producers
            .iter()
            .filter(|(_, h)| !h.is_closed())
            .map(|(run, _)| run.clone())
            .collect()
    }

    pub async fn has_producers(&self) -> bool {
        !self.peers.read().await.producers.is_empty()
    }

    pub async fn consumer_count(&self) -> usize {
        self.peers.read().await.consumers.len()
    }

    // ════════════════════════════════════════════════════════════════════
    // Delivery
    // ════════════════════════════════════════════════════════════════════

    /// Fans a message out to every consumer. Failed sends are logged and
    /// skipped. Returns how many consumers accepted it.
    pub async fn send_to_consumers(&self, message: &EventMessage) -> usize {
        let peers = self.peers.read().await;
        let mut delivered = 0;
        for consumer in &peers.consumers {
            match consumer.send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(
                    project_id = %self.project_id,
                    connection_id = %consumer.id(),
                    event_type = %message.event_type,
                    error = %e,
                    "dropping message for consumer"
                ),
            }
        }
        delivered
    }

    /// Sends to one consumer. Returns whether it was queued.
    pub async fn send_to_consumer(&self, connection: ConnectionId, message: EventMessage) -> bool {
        let peers = self.peers.read().await;
        let Some(consumer) = peers.consumers.iter().find(|h| h.id() == connection) else {
            tracing::debug!(
                project_id = %self.project_id,
                connection_id = %connection,
                "consumer gone, dropping message"
            );
            return false;
        };
        match consumer.send(message) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    project_id = %self.project_id,
                    connection_id = %connection,
                    error = %e,
                    "dropping message for consumer"
                );
                false
            }
        }
    }

    /// Sends to the producer of `run_id`. An offline run is a silent no-op.
    pub async fn send_to_producer(&self, run_id: &RunId, message: EventMessage) -> bool {
        let peers = self.peers.read().await;
        let Some(producer) = peers.producers.get(run_id) else {
            tracing::debug!(
                project_id = %self.project_id,
                run_id = %run_id,
                event_type = %message.event_type,
                "run offline, dropping message"
            );
            return false;
        };
        match producer.send(message) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    project_id = %self.project_id,
                    run_id = %run_id,
                    error = %e,
                    "dropping message for producer"
                );
                false
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════
    // Action correlation
    // ════════════════════════════════════════════════════════════════════

    /// Records that `consumer` awaits the reply to action `event_id` on `run_id`.
    pub async fn remember_action(&self, run_id: RunId, event_id: i64, consumer: ConnectionId) {
        self.peers
            .write()
            .await
            .pending_actions
            .insert((run_id, event_id), consumer);
    }

    /// Takes the consumer awaiting the reply to `event_id` on `run_id`.
    pub async fn take_action_requester(
        &self,
        run_id: &RunId,
        event_id: i64,
    ) -> Option<ConnectionId> {
        self.peers
            .write()
            .await
            .pending_actions
            .remove(&(run_id.clone(), event_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteHistoryStore;
    use crate::domain::event::{IdentityType, QueryCondition};
    use crate::ports::{BlobRow, EventRow, RunInfo, StatusMap, StoreError, WriteOptions};
    use serde_json::{Map, Value};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    async fn bridge(dir: &TempDir) -> Bridge {
        let project_id = ProjectId::new("p").unwrap();
        let store = SqliteHistoryStore::open(project_id.clone(), dir.path().join("p.projectdb"), false)
            .await
            .unwrap();
        Bridge::new(project_id, Arc::new(store))
    }

    fn run(id: &str) -> RunId {
        RunId::new(id).unwrap()
    }

    #[tokio::test]
    async fn second_live_producer_is_rejected() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let (first, _rx1) = ConnectionHandle::channel(4);
        let (second, _rx2) = ConnectionHandle::channel(4);

        bridge.attach_producer(run("r"), first).await.unwrap();
        let result = bridge.attach_producer(run("r"), second).await;
        assert!(matches!(result, Err(BridgeError::RunAlreadyConnected(_))));
    }

    #[tokio::test]
    async fn stale_producer_is_replaced() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let (first, rx1) = ConnectionHandle::channel(4);
        let (second, _rx2) = ConnectionHandle::channel(4);
        drop(rx1);

        bridge.attach_producer(run("r"), first).await.unwrap();
        bridge.attach_producer(run("r"), second).await.unwrap();
        assert!(bridge.is_online(&run("r")).await);
    }

    #[tokio::test]
    async fn delete_run_refuses_live_producer() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        bridge
            .store()
            .write_event("log", &serde_json::json!("x"), WriteOptions::new().run_id(run("r")))
            .await
            .unwrap();
        let (producer, rx) = ConnectionHandle::channel(4);
        bridge.attach_producer(run("r"), producer).await.unwrap();

        let result = bridge.delete_run(&run("r")).await;
        assert!(matches!(result, Err(BridgeError::RunAlreadyConnected(_))));
        assert_eq!(bridge.store().get_run_ids().await.unwrap().len(), 1);

        // A producer whose transport is gone no longer protects the run.
        drop(rx);
        assert!(bridge.delete_run(&run("r")).await.unwrap());
        assert!(!bridge.delete_run(&run("r")).await.unwrap());
    }

    #[tokio::test]
    async fn producer_handshake_waits_for_running_delete() {
        let dir = TempDir::new().unwrap();
        let inner = SqliteHistoryStore::open(ProjectId::new("p").unwrap(), dir.path().join("p.projectdb"), false)
            .await
            .unwrap();
        let store = Arc::new(GatedStore {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
        });
        let bridge = Arc::new(Bridge::new(ProjectId::new("p").unwrap(), store.clone()));
        bridge
            .store()
            .write_event("log", &serde_json::json!("x"), WriteOptions::new().run_id(run("r")))
            .await
            .unwrap();

        let deleting = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.delete_run(&run("r")).await })
        };
        store.entered.notified().await;

        let (producer, _rx) = ConnectionHandle::channel(4);
        let attach = bridge.attach_producer(run("r"), producer);
        tokio::pin!(attach);
        let early = tokio::time::timeout(Duration::from_millis(50), &mut attach).await;
        assert!(early.is_err(), "handshake must wait for the delete");

        store.release.notify_one();
        assert!(deleting.await.unwrap().unwrap());
        attach.await.unwrap();
        assert!(bridge.is_online(&run("r")).await);
        assert!(bridge.store().get_run_ids().await.unwrap().is_empty());
    }

    /// Store whose run delete pauses until released.
    struct GatedStore {
        inner: SqliteHistoryStore,
        entered: Notify,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl HistoryStore for GatedStore {
        fn project_id(&self) -> &ProjectId {
            self.inner.project_id()
        }

        async fn write_event(&self, table: &str, payload: &Value, options: WriteOptions) -> Result<i64, StoreError> {
            self.inner.write_event(table, payload, options).await
        }

        async fn write_blob(
            &self,
            table: &str,
            metadata: &Value,
            blob: &[u8],
            options: WriteOptions,
        ) -> Result<i64, StoreError> {
            self.inner.write_blob(table, metadata, blob, options).await
        }

        async fn read_events(&self, table: &str, condition: &QueryCondition) -> Result<Vec<EventRow>, StoreError> {
            self.inner.read_events(table, condition).await
        }

        async fn read_blobs(
            &self,
            table: &str,
            condition: &QueryCondition,
            meta_only: bool,
        ) -> Result<Vec<BlobRow>, StoreError> {
            self.inner.read_blobs(table, condition, meta_only).await
        }

        async fn set_status(&self, run_id: &RunId, series: &str, value: &Value) -> Result<i64, StoreError> {
            self.inner.set_status(run_id, series, value).await
        }

        async fn get_status(&self, run_id: Option<&RunId>, series: Option<&str>) -> Result<StatusMap, StoreError> {
            self.inner.get_status(run_id, series).await
        }

        async fn get_run_ids(&self) -> Result<Vec<RunInfo>, StoreError> {
            self.inner.get_run_ids().await
        }

        async fn delete_run_id(&self, run_id: &RunId) -> Result<bool, StoreError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.delete_run_id(run_id).await
        }

        async fn fetch_or_create_metadata(
            &self,
            run_id: &RunId,
            updates: Option<Map<String, Value>>,
        ) -> Result<Map<String, Value>, StoreError> {
            self.inner.fetch_or_create_metadata(run_id, updates).await
        }

        async fn series_of(&self, table: &str, run_id: Option<&RunId>) -> Result<Vec<String>, StoreError> {
            self.inner.series_of(table, run_id).await
        }

        async fn size_bytes(&self) -> Result<u64, StoreError> {
            self.inner.size_bytes().await
        }

        async fn destroy(&self) -> Result<(), StoreError> {
            self.inner.destroy().await
        }
    }

    #[tokio::test]
    async fn detach_ignores_other_connections() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let (producer, _rx) = ConnectionHandle::channel(4);
        bridge.attach_producer(run("r"), producer).await.unwrap();

        assert!(!bridge.detach_producer(&run("r"), ConnectionId::new()).await);
        assert!(bridge.is_online(&run("r")).await);
    }

    #[tokio::test]
    async fn fan_out_skips_closed_consumers() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let (a, mut rx_a) = ConnectionHandle::channel(4);
        let (b, rx_b) = ConnectionHandle::channel(4);
        let (c, mut rx_c) = ConnectionHandle::channel(4);
        drop(rx_b);
        for handle in [a, b, c] {
            bridge.attach_consumer(handle).await;
        }

        let delivered = bridge
            .send_to_consumers(&EventMessage::new("scalar", IdentityType::Cli))
            .await;
        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
    }

    #[tokio::test]
    async fn send_to_offline_run_is_noop() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let sent = bridge
            .send_to_producer(&run("nobody"), EventMessage::new("action", IdentityType::Web))
            .await;
        assert!(!sent);
    }

    #[tokio::test]
    async fn pending_action_is_taken_once() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let asker = ConnectionId::new();
        bridge.remember_action(run("r"), 7, asker).await;

        assert_eq!(bridge.take_action_requester(&run("r"), 7).await, Some(asker));
        assert_eq!(bridge.take_action_requester(&run("r"), 7).await, None);
    }

    #[tokio::test]
    async fn detaching_consumer_forgets_its_actions() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let (consumer, _rx) = ConnectionHandle::channel(4);
        let id = consumer.id();
        bridge.attach_consumer(consumer).await;
        bridge.remember_action(run("r"), 1, id).await;

        assert!(bridge.detach_consumer(id).await);
        assert_eq!(bridge.take_action_requester(&run("r"), 1).await, None);
        assert_eq!(bridge.consumer_count().await, 0);
    }

    #[tokio::test]
    async fn retired_bridge_refuses_producers() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        bridge.retire().await.unwrap();
        let (producer, _rx) = ConnectionHandle::channel(4);
        let result = bridge.attach_producer(run("r"), producer).await;
        assert!(matches!(result, Err(BridgeError::Retired(_))));
    }
}
