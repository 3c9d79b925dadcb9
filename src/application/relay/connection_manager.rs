//! Handshake and identity binding for duplex connections.
//!
//! Each connection moves through
//!
//! ```text
//! Unidentified --handshake ok--> Identified --close--> Closed
//!       |                                                ^
//!       +----------------------close---------------------+
//! ```
//!
//! Before identification only `handshake` is processed. Once identified,
//! a message may not claim another identity, project or run than the one
//! bound at handshake.

use std::sync::Arc;

use crate::application::bridge::{Bridge, BridgeError, BridgeRegistry, ConnectionHandle};
use crate::domain::event::{EventKind, EventMessage, IdentityType};
use crate::domain::foundation::{ConnectionId, ErrorCode, ProjectId, RunId};

use super::router::{EventRouter, Origin, Routed};

/// What a connection is bound to after a successful handshake.
#[derive(Clone)]
pub enum Binding {
    Producer { bridge: Arc<Bridge>, run_id: RunId },
    Consumer { bridge: Arc<Bridge> },
}

impl Binding {
    pub fn bridge(&self) -> &Arc<Bridge> {
        match self {
            Binding::Producer { bridge, .. } | Binding::Consumer { bridge } => bridge,
        }
    }

    pub fn identity(&self) -> IdentityType {
        match self {
            Binding::Producer { .. } => IdentityType::Cli,
            Binding::Consumer { .. } => IdentityType::Web,
        }
    }
}

pub enum SessionState {
    Unidentified,
    Identified(Binding),
    Closed,
}

impl SessionState {
    pub fn is_identified(&self) -> bool {
        matches!(self, SessionState::Identified(_))
    }
}

/// Shared entry point for new connections.
#[derive(Clone)]
pub struct ConnectionManager {
    registry: Arc<BridgeRegistry>,
    router: EventRouter,
    outbound_buffer: usize,
}

impl ConnectionManager {
    pub fn new(registry: Arc<BridgeRegistry>, outbound_buffer: usize) -> Self {
        Self {
            registry,
            router: EventRouter::new(),
            outbound_buffer,
        }
    }

    pub fn registry(&self) -> &Arc<BridgeRegistry> {
        &self.registry
    }

    /// Starts a session for a freshly accepted connection. The receiver
    /// yields everything the relay wants written to the socket.
    pub fn connect(
        &self,
    ) -> (
        ConnectionSession,
        tokio::sync::mpsc::Receiver<EventMessage>,
    ) {
        let (handle, outbound) = ConnectionHandle::channel(self.outbound_buffer);
        tracing::debug!(connection_id = %handle.id(), "connection opened");
        let session = ConnectionSession {
            manager: self.clone(),
            handle,
            state: SessionState::Unidentified,
        };
        (session, outbound)
    }
}

/// Inbound side of one connection. Messages are handled one at a time in
/// receipt order.
pub struct ConnectionSession {
    manager: ConnectionManager,
    handle: ConnectionHandle,
    state: SessionState,
}

impl ConnectionSession {
    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Handles one text frame. Malformed frames are logged and dropped.
    pub async fn on_text(&mut self, text: &str) {
        match EventMessage::parse(text) {
            Ok(message) => self.on_message(message).await,
            Err(e) => tracing::warn!(
                connection_id = %self.id(),
                error = %e,
                "malformed message dropped"
            ),
        }
    }

    pub async fn on_message(&mut self, message: EventMessage) {
        if matches!(self.state, SessionState::Closed) {
            return;
        }
        if message.kind() == EventKind::Handshake {
            self.on_handshake(message).await;
            return;
        }

        let SessionState::Identified(binding) = &self.state else {
            tracing::warn!(
                connection_id = %self.id(),
                event_type = %message.event_type,
                "message before handshake dropped"
            );
            return;
        };
        let binding = binding.clone();

        let Some(message) = self.bind_message(&binding, message) else {
            return;
        };
        let origin = match &binding {
            Binding::Producer { run_id, .. } => Origin::Producer(run_id.clone()),
            Binding::Consumer { .. } => Origin::Consumer(self.id()),
        };
        let event_type = message.event_type.clone();

        match self
            .manager
            .router
            .dispatch(binding.bridge(), &origin, message)
            .await
        {
            Ok(Routed::Dropped) => {}
            Ok(routed) => tracing::trace!(
                connection_id = %self.id(),
                event_type = %event_type,
                ?routed,
                "message routed"
            ),
            Err(e) => tracing::error!(
                connection_id = %self.id(),
                project_id = %binding.bridge().project_id(),
                event_type = %event_type,
                error = %e,
                "failed to persist message, dropped"
            ),
        }
    }

    /// Applies the anti-spoofing checks and fills in bound identity fields.
    fn bind_message(&self, binding: &Binding, mut message: EventMessage) -> Option<EventMessage> {
        let bound = binding.identity();
        match message.identity_type {
            Some(claimed) if claimed != bound => {
                tracing::warn!(
                    connection_id = %self.id(),
                    bound = %bound,
                    claimed = %claimed,
                    "identity mismatch, message dropped"
                );
                return None;
            }
            Some(_) => {}
            None => message.identity_type = Some(bound),
        }

        let project_id = binding.bridge().project_id();
        match &message.project_id {
            Some(claimed) if claimed != project_id => {
                tracing::warn!(
                    connection_id = %self.id(),
                    project_id = %project_id,
                    claimed = %claimed,
                    "project mismatch, message dropped"
                );
                return None;
            }
            Some(_) => {}
            None => message.project_id = Some(project_id.clone()),
        }

        if let Binding::Producer { run_id, .. } = binding {
            match &message.run_id {
                Some(claimed) if claimed != run_id => {
                    tracing::warn!(
                        connection_id = %self.id(),
                        run_id = %run_id,
                        claimed = %claimed,
                        "run mismatch, message dropped"
                    );
                    return None;
                }
                Some(_) => {}
                None => message.run_id = Some(run_id.clone()),
            }
        }

        Some(message)
    }

    async fn on_handshake(&mut self, message: EventMessage) {
        if self.state.is_identified() {
            tracing::warn!(connection_id = %self.id(), "duplicate handshake rejected");
            self.reply(message.rejected(ErrorCode::DuplicateHandshake, "duplicate handshake"));
            return;
        }

        let Some(project_id) = message.project_id.clone() else {
            tracing::warn!(connection_id = %self.id(), "handshake without projectid dropped");
            return;
        };

        match message.identity_type {
            Some(IdentityType::Web) => self.join_as_consumer(project_id, message).await,
            Some(IdentityType::Cli) => {
                let Some(run_id) = message.run_id.clone() else {
                    tracing::warn!(
                        connection_id = %self.id(),
                        project_id = %project_id,
                        "cli handshake without runid dropped"
                    );
                    return;
                };
                self.join_as_producer(project_id, run_id, message).await;
            }
            other => {
                tracing::warn!(
                    connection_id = %self.id(),
                    project_id = %project_id,
                    identity = ?other,
                    "handshake with unsupported identity dropped"
                );
            }
        }
    }

    async fn join_as_consumer(&mut self, project_id: ProjectId, message: EventMessage) {
        let Some(bridge) = self.manager.registry.get(&project_id).await else {
            tracing::info!(
                connection_id = %self.id(),
                project_id = %project_id,
                "consumer handshake for unknown project"
            );
            self.reply(message.rejected(
                ErrorCode::ProjectNotFound,
                format!("project {} not found", project_id),
            ));
            return;
        };

        bridge.attach_consumer(self.handle.clone()).await;
        self.state = SessionState::Identified(Binding::Consumer { bridge });
        tracing::info!(connection_id = %self.id(), project_id = %project_id, "consumer joined");
        self.reply(message.accepted());
    }

    async fn join_as_producer(&mut self, project_id: ProjectId, run_id: RunId, message: EventMessage) {
        // A bridge may be retired between lookup and attach; one retry
        // picks up its replacement.
        let mut attempts = 0;
        let bridge = loop {
            attempts += 1;
            let bridge = match self.manager.registry.get_or_create(&project_id).await {
                Ok(bridge) => bridge,
                Err(e) => {
                    tracing::error!(
                        connection_id = %self.id(),
                        project_id = %project_id,
                        error = %e,
                        "could not open project for producer"
                    );
                    self.reply(message.rejected(ErrorCode::InternalError, e.to_string()));
                    return;
                }
            };
            match bridge.attach_producer(run_id.clone(), self.handle.clone()).await {
                Ok(()) => break bridge,
                Err(BridgeError::Retired(_)) if attempts < 2 => continue,
                Err(BridgeError::RunAlreadyConnected(_)) => {
                    tracing::warn!(
                        connection_id = %self.id(),
                        project_id = %project_id,
                        run_id = %run_id,
                        "run id already connected"
                    );
                    self.reply(
                        message.rejected(ErrorCode::RunAlreadyConnected, "run id already connected"),
                    );
                    return;
                }
                Err(e) => {
                    tracing::error!(
                        connection_id = %self.id(),
                        project_id = %project_id,
                        error = %e,
                        "producer handshake failed"
                    );
                    self.reply(message.rejected(ErrorCode::InternalError, e.to_string()));
                    return;
                }
            }
        };

        self.state = SessionState::Identified(Binding::Producer {
            bridge,
            run_id: run_id.clone(),
        });
        tracing::info!(
            connection_id = %self.id(),
            project_id = %project_id,
            run_id = %run_id,
            "producer joined"
        );
        self.reply(message.accepted());
    }

    fn reply(&self, message: EventMessage) {
        if let Err(e) = self.handle.send(message) {
            tracing::debug!(connection_id = %self.id(), error = %e, "reply not delivered");
        }
    }

    /// Releases whatever the connection was bound to. Safe to call twice.
    pub async fn close(&mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);
        match state {
            SessionState::Identified(Binding::Producer { bridge, run_id }) => {
                bridge.detach_producer(&run_id, self.id()).await;
                tracing::info!(
                    connection_id = %self.id(),
                    project_id = %bridge.project_id(),
                    run_id = %run_id,
                    "producer left"
                );
            }
            SessionState::Identified(Binding::Consumer { bridge }) => {
                bridge.detach_consumer(self.id()).await;
                tracing::info!(
                    connection_id = %self.id(),
                    project_id = %bridge.project_id(),
                    "consumer left"
                );
            }
            SessionState::Unidentified => {
                tracing::debug!(connection_id = %self.id(), "unidentified connection closed");
            }
            SessionState::Closed => {}
        }
    }
}
