//! Post-handshake dispatch by event type.
//!
//! | kind          | persisted                         | forwarded        |
//! |---------------|-----------------------------------|------------------|
//! | `status`      | status table, upsert              | no               |
//! | `hyperparams` | merged into status `hyperparams`  | no               |
//! | `action`      | no                                | other side       |
//! | `image`       | no (upload endpoint only)         | other side       |
//! | anything else | same-named table, `history-len`   | other side       |
//!
//! "Other side" means every consumer for a producer's message, and the
//! producer of the named run for a consumer's message.

use serde_json::{Map, Value};

use crate::application::bridge::Bridge;
use crate::domain::event::{EventKind, EventMessage};
use crate::domain::foundation::{ConnectionId, RunId};
use crate::ports::{StoreError, WriteOptions};

/// Status series the hyperparameter object lives under.
pub const HYPERPARAMS_SERIES: &str = "hyperparams";

/// Who sent a message, as bound at handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Producer(RunId),
    Consumer(ConnectionId),
}

/// What the router did with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Appended to history with this row id, then forwarded.
    Stored { id: i64, delivered: usize },
    /// Upserted into the status table.
    StatusUpdated,
    /// Forwarded without persistence.
    Forwarded { delivered: usize },
    /// Dropped; the reason has been logged.
    Dropped,
}

/// Stateless dispatch table.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventRouter;

impl EventRouter {
    pub fn new() -> Self {
        Self
    }

    /// Routes one identified message. Status and hyperparameter store
    /// failures are returned so the caller can log them against the
    /// connection. A generic event whose write fails is still forwarded.
    pub async fn dispatch(
        &self,
        bridge: &Bridge,
        origin: &Origin,
        mut message: EventMessage,
    ) -> Result<Routed, StoreError> {
        match message.kind() {
            EventKind::Handshake => {
                tracing::debug!(project_id = %bridge.project_id(), "late handshake ignored by router");
                Ok(Routed::Dropped)
            }
            EventKind::Status => self.on_status(bridge, message).await,
            EventKind::Hyperparams => self.on_hyperparams(bridge, message).await,
            EventKind::Action => Ok(self.on_action(bridge, origin, message).await),
            EventKind::Image => {
                let delivered = self.forward(bridge, origin, message).await;
                Ok(Routed::Forwarded { delivered })
            }
            kind => {
                let options = WriteOptions {
                    series: message.series.clone(),
                    run_id: message.run_id.clone(),
                    timestamp: Some(message.timestamp.clone()),
                    retention_limit: message.retention_limit(),
                };
                match bridge
                    .store()
                    .write_event(kind.as_str(), &message.payload, options)
                    .await
                {
                    Ok(id) => {
                        message.id = Some(id);
                        let delivered = self.forward(bridge, origin, message).await;
                        Ok(Routed::Stored { id, delivered })
                    }
                    Err(e) => {
                        tracing::warn!(
                            project_id = %bridge.project_id(),
                            event_type = %kind.as_str(),
                            error = %e,
                            "event not persisted, forwarding anyway"
                        );
                        let delivered = self.forward(bridge, origin, message).await;
                        Ok(Routed::Forwarded { delivered })
                    }
                }
            }
        }
    }

    async fn on_status(&self, bridge: &Bridge, message: EventMessage) -> Result<Routed, StoreError> {
        let (Some(run_id), Some(series)) = (&message.run_id, &message.series) else {
            tracing::warn!(
                project_id = %bridge.project_id(),
                "status without runid or series dropped"
            );
            return Ok(Routed::Dropped);
        };
        bridge
            .store()
            .set_status(run_id, series, &message.payload)
            .await?;
        Ok(Routed::StatusUpdated)
    }

    async fn on_hyperparams(
        &self,
        bridge: &Bridge,
        message: EventMessage,
    ) -> Result<Routed, StoreError> {
        let Some(run_id) = &message.run_id else {
            tracing::warn!(project_id = %bridge.project_id(), "hyperparams without runid dropped");
            return Ok(Routed::Dropped);
        };

        let mut status = bridge
            .store()
            .get_status(Some(run_id), Some(HYPERPARAMS_SERIES))
            .await?;
        let mut current = match status
            .remove(run_id.as_str())
            .and_then(|mut by_series| by_series.remove(HYPERPARAMS_SERIES))
        {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        match (&message.series, message.payload) {
            (Some(series), payload) => {
                current.insert(series.clone(), payload);
            }
            (None, Value::Object(updates)) => current.extend(updates),
            (None, _) => {
                tracing::warn!(
                    project_id = %bridge.project_id(),
                    run_id = %run_id,
                    "hyperparams payload is not an object, dropped"
                );
                return Ok(Routed::Dropped);
            }
        }

        bridge
            .store()
            .set_status(run_id, HYPERPARAMS_SERIES, &Value::Object(current))
            .await?;
        Ok(Routed::StatusUpdated)
    }

    /// Actions are never stored. A consumer's request is remembered so the
    /// producer's reply with the same event id goes back to that consumer
    /// only.
    async fn on_action(&self, bridge: &Bridge, origin: &Origin, message: EventMessage) -> Routed {
        match origin {
            Origin::Consumer(connection) => {
                if let (Some(run_id), true) = (&message.run_id, message.event_id >= 0) {
                    bridge
                        .remember_action(run_id.clone(), message.event_id, *connection)
                        .await;
                }
            }
            Origin::Producer(run_id) => {
                if message.event_id >= 0 {
                    if let Some(asker) = bridge.take_action_requester(run_id, message.event_id).await {
                        let delivered = bridge.send_to_consumer(asker, message).await;
                        return Routed::Forwarded {
                            delivered: usize::from(delivered),
                        };
                    }
                }
            }
        }
        let delivered = self.forward(bridge, origin, message).await;
        Routed::Forwarded { delivered }
    }

    async fn forward(&self, bridge: &Bridge, origin: &Origin, message: EventMessage) -> usize {
        match origin {
            Origin::Producer(_) => bridge.send_to_consumers(&message).await,
            Origin::Consumer(_) => match message.run_id.clone() {
                Some(run_id) => usize::from(bridge.send_to_producer(&run_id, message).await),
                None => {
                    tracing::debug!(
                        project_id = %bridge.project_id(),
                        event_type = %message.event_type,
                        "consumer message without runid not forwarded"
                    );
                    0
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteHistoryStore;
    use crate::application::bridge::ConnectionHandle;
    use crate::domain::event::{IdentityType, QueryCondition};
    use crate::domain::foundation::ProjectId;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

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

    fn from_producer(event_type: &str) -> EventMessage {
        EventMessage::new(event_type, IdentityType::Cli).with_run(run("r"))
    }

    #[tokio::test]
    async fn generic_event_is_stored_and_forwarded_with_id() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let (consumer, mut rx) = ConnectionHandle::channel(4);
        bridge.attach_consumer(consumer).await;

        let routed = EventRouter::new()
            .dispatch(
                &bridge,
                &Origin::Producer(run("r")),
                from_producer("scalar").with_series("loss").with_payload(json!({"v": 1})),
            )
            .await
            .unwrap();

        let Routed::Stored { id, delivered } = routed else {
            panic!("expected Stored, got {:?}", routed);
        };
        assert_eq!(delivered, 1);
        assert_eq!(rx.try_recv().unwrap().id, Some(id));
        let rows = bridge
            .store()
            .read_events("scalar", &QueryCondition::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn free_form_event_types_are_stored_under_their_own_name() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let (consumer, mut rx) = ConnectionHandle::channel(4);
        bridge.attach_consumer(consumer).await;
        let router = EventRouter::new();

        for event_type in ["train.loss", "grad norm"] {
            let routed = router
                .dispatch(&bridge, &Origin::Producer(run("r")), from_producer(event_type))
                .await
                .unwrap();
            assert!(matches!(routed, Routed::Stored { delivered: 1, .. }), "{}", event_type);
            assert_eq!(rx.try_recv().unwrap().event_type, event_type);
            let rows = bridge
                .store()
                .read_events(event_type, &QueryCondition::new())
                .await
                .unwrap();
            assert_eq!(rows.len(), 1);
        }
    }

    #[tokio::test]
    async fn unstorable_event_type_is_still_forwarded() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let (consumer, mut rx) = ConnectionHandle::channel(4);
        bridge.attach_consumer(consumer).await;

        let routed = EventRouter::new()
            .dispatch(&bridge, &Origin::Producer(run("r")), from_producer("version"))
            .await
            .unwrap();
        assert_eq!(routed, Routed::Forwarded { delivered: 1 });
        let forwarded = rx.try_recv().unwrap();
        assert_eq!(forwarded.event_type, "version");
        assert_eq!(forwarded.id, None);
    }

    #[tokio::test]
    async fn status_is_upserted_not_forwarded() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let (consumer, mut rx) = ConnectionHandle::channel(4);
        bridge.attach_consumer(consumer).await;
        let router = EventRouter::new();
        let origin = Origin::Producer(run("r"));

        for v in [1, 2] {
            let msg = from_producer("status").with_series("config").with_payload(json!({"a": v}));
            assert_eq!(router.dispatch(&bridge, &origin, msg).await.unwrap(), Routed::StatusUpdated);
        }

        let status = bridge.store().get_status(Some(&run("r")), None).await.unwrap();
        assert_eq!(status["r"]["config"], json!({"a": 2}));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn status_without_series_is_dropped() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let routed = EventRouter::new()
            .dispatch(&bridge, &Origin::Producer(run("r")), from_producer("status"))
            .await
            .unwrap();
        assert_eq!(routed, Routed::Dropped);
    }

    #[tokio::test]
    async fn hyperparams_merge_key_by_key() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let router = EventRouter::new();
        let origin = Origin::Producer(run("r"));

        router
            .dispatch(&bridge, &origin, from_producer("hyperparams").with_payload(json!({"lr": 0.1, "bs": 32})))
            .await
            .unwrap();
        router
            .dispatch(&bridge, &origin, from_producer("hyperparameters").with_payload(json!({"lr": 0.01})))
            .await
            .unwrap();
        router
            .dispatch(
                &bridge,
                &origin,
                from_producer("hyperparams").with_series("optimizer").with_payload(json!("adam")),
            )
            .await
            .unwrap();

        let status = bridge.store().get_status(Some(&run("r")), None).await.unwrap();
        assert_eq!(
            status["r"][HYPERPARAMS_SERIES],
            json!({"lr": 0.01, "bs": 32, "optimizer": "adam"})
        );
    }

    #[tokio::test]
    async fn image_events_are_forwarded_only() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let routed = EventRouter::new()
            .dispatch(&bridge, &Origin::Producer(run("r")), from_producer("image"))
            .await
            .unwrap();
        assert_eq!(routed, Routed::Forwarded { delivered: 0 });
        assert!(bridge.store().get_run_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn action_reply_goes_to_requester_only() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let (producer, mut producer_rx) = ConnectionHandle::channel(4);
        let (asker, mut asker_rx) = ConnectionHandle::channel(4);
        let (bystander, mut bystander_rx) = ConnectionHandle::channel(4);
        let asker_id = asker.id();
        bridge.attach_producer(run("r"), producer).await.unwrap();
        bridge.attach_consumer(asker).await;
        bridge.attach_consumer(bystander).await;
        let router = EventRouter::new();

        let request = EventMessage::new("action", IdentityType::Web)
            .with_run(run("r"))
            .with_event_id(7)
            .with_payload(json!({"name": "foo", "args": {}}));
        router
            .dispatch(&bridge, &Origin::Consumer(asker_id), request)
            .await
            .unwrap();
        assert_eq!(producer_rx.try_recv().unwrap().event_id, 7);

        let reply = from_producer("action").with_event_id(7).with_payload(json!({"result": 1}));
        let routed = router
            .dispatch(&bridge, &Origin::Producer(run("r")), reply)
            .await
            .unwrap();
        assert_eq!(routed, Routed::Forwarded { delivered: 1 });
        assert_eq!(asker_rx.try_recv().unwrap().payload["result"], 1);
        assert!(bystander_rx.try_recv().is_err());
        assert!(bridge.store().get_run_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsolicited_producer_action_is_broadcast() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let (a, mut rx_a) = ConnectionHandle::channel(4);
        let (b, mut rx_b) = ConnectionHandle::channel(4);
        bridge.attach_consumer(a).await;
        bridge.attach_consumer(b).await;

        let routed = EventRouter::new()
            .dispatch(&bridge, &Origin::Producer(run("r")), from_producer("action"))
            .await
            .unwrap();
        assert_eq!(routed, Routed::Forwarded { delivered: 2 });
        assert!(rx_a.try_recv().is_ok() && rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn consumer_message_goes_to_named_run_only() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let (r1, mut rx1) = ConnectionHandle::channel(4);
        let (r2, mut rx2) = ConnectionHandle::channel(4);
        bridge.attach_producer(run("r1"), r1).await.unwrap();
        bridge.attach_producer(run("r2"), r2).await.unwrap();

        let msg = EventMessage::new("note", IdentityType::Web).with_run(run("r2"));
        EventRouter::new()
            .dispatch(&bridge, &Origin::Consumer(ConnectionId::new()), msg)
            .await
            .unwrap();
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn retention_hint_is_honored() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir).await;
        let router = EventRouter::new();
        for i in 0..15 {
            let msg = from_producer("log").with_history_len(10).with_payload(json!(i));
            router
                .dispatch(&bridge, &Origin::Producer(run("r")), msg)
                .await
                .unwrap();
        }
        let rows = bridge.store().read_events("log", &QueryCondition::new()).await.unwrap();
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].json, json!(5));
    }
}
