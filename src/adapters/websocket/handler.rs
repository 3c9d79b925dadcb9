//! WebSocket upgrade handler for the relay endpoint.
//!
//! Handles the HTTP → WebSocket upgrade and drives one connection:
//! 1. Open a session on the connection manager
//! 2. Forward the session's outbound queue to the socket
//! 3. Feed inbound text frames to the session, one at a time
//! 4. Release the session's bindings on disconnect

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::application::relay::{ConnectionManager, ConnectionSession};
use crate::domain::event::EventMessage;
use crate::domain::foundation::ConnectionId;

use super::messages::{decode, encode, Inbound};

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    pub manager: ConnectionManager,
    /// Unidentified connections are dropped after this long.
    pub handshake_timeout: Option<Duration>,
}

impl WebSocketState {
    pub fn new(manager: ConnectionManager, handshake_timeout: Option<Duration>) -> Self {
        Self {
            manager,
            handshake_timeout,
        }
    }
}

/// Route: `GET /ws/project`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebSocketState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WebSocketState) {
    let (sender, mut receiver) = socket.split();
    let (mut session, outbound) = state.manager.connect();
    let connection_id = session.id();

    let mut send_task = tokio::spawn(forward_outbound(sender, outbound, connection_id));

    tokio::select! {
        _ = receive_loop(&mut receiver, &mut session, state.handshake_timeout) => {
            send_task.abort();
        }
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "outbound side closed");
        }
    }

    session.close().await;
}

/// Writes queued envelopes to the socket until either side goes away.
async fn forward_outbound(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<EventMessage>,
    connection_id: ConnectionId,
) {
    while let Some(message) = outbound.recv().await {
        let frame = match encode(&message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "envelope encoding failed");
                continue;
            }
        };
        if let Err(e) = sender.send(frame).await {
            tracing::debug!(connection_id = %connection_id, "Send error, closing connection: {}", e);
            break;
        }
    }
}

/// Feeds inbound frames to the session until the peer leaves, or until the
/// handshake deadline passes on a still unidentified session.
async fn receive_loop<S, E>(
    receiver: &mut S,
    session: &mut ConnectionSession,
    handshake_timeout: Option<Duration>,
) where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let deadline = handshake_timeout.map(|timeout| Instant::now() + timeout);

    loop {
        let pending = deadline.filter(|_| !session.state().is_identified());
        let next = match pending {
            Some(at) => match tokio::time::timeout_at(at, receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::warn!(connection_id = %session.id(), "handshake timed out");
                    return;
                }
            },
            None => receiver.next().await,
        };

        match next {
            Some(Ok(frame)) => match decode(frame) {
                Inbound::Text(text) => session.on_text(&text).await,
                Inbound::Close => {
                    tracing::debug!(connection_id = %session.id(), "Client sent close frame");
                    return;
                }
                Inbound::Skip => {}
            },
            Some(Err(e)) => {
                tracing::debug!(connection_id = %session.id(), "Receive error: {}", e);
                return;
            }
            None => return,
        }
    }
}

/// Router exposing the relay endpoint, with and without a trailing slash.
pub fn websocket_router(state: WebSocketState) -> Router {
    Router::new()
        .route("/ws/project", get(ws_handler))
        .route("/ws/project/", get(ws_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteStoreFactory;
    use crate::application::bridge::BridgeRegistry;
    use crate::domain::event::IdentityType;
    use crate::domain::foundation::{ProjectId, RunId};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::channel::mpsc::{unbounded, UnboundedSender};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    type Frames = UnboundedSender<Result<Message, axum::Error>>;

    fn manager(dir: &TempDir) -> ConnectionManager {
        let factory = Arc::new(SqliteStoreFactory::new(dir.path(), "projectdb", false));
        let registry = Arc::new(BridgeRegistry::new(factory));
        ConnectionManager::new(registry, 8)
    }

    fn state(dir: &TempDir) -> WebSocketState {
        WebSocketState::new(manager(dir), Some(Duration::from_secs(5)))
    }

    fn handshake_frame() -> Message {
        let handshake = EventMessage::new("handshake", IdentityType::Cli)
            .with_project(ProjectId::new("p").unwrap())
            .with_run(RunId::new("r").unwrap());
        Message::Text(serde_json::to_string(&handshake).unwrap())
    }

    #[tokio::test]
    async fn unidentified_connection_is_dropped_at_deadline() {
        let dir = TempDir::new().unwrap();
        let (mut session, _outbound) = manager(&dir).connect();
        let (_frames, mut inbound) = unbounded::<Result<Message, axum::Error>>();

        let finished = tokio::time::timeout(
            Duration::from_secs(5),
            receive_loop(&mut inbound, &mut session, Some(Duration::from_millis(50))),
        )
        .await;
        assert!(finished.is_ok(), "silent connection outlived its handshake deadline");
        assert!(!session.state().is_identified());
    }

    #[tokio::test]
    async fn identified_connection_outlives_deadline() {
        let dir = TempDir::new().unwrap();
        let (mut session, mut outbound) = manager(&dir).connect();
        let (frames, mut inbound): (Frames, _) = unbounded();
        frames.unbounded_send(Ok(handshake_frame())).unwrap();

        let finished = tokio::time::timeout(
            Duration::from_millis(300),
            receive_loop(&mut inbound, &mut session, Some(Duration::from_millis(50))),
        )
        .await;
        assert!(finished.is_err(), "identified connection was dropped");
        assert!(session.state().is_identified());
        assert_eq!(outbound.try_recv().unwrap().payload["result"], 200);
    }

    #[tokio::test]
    async fn without_deadline_silent_connection_stays_open() {
        let dir = TempDir::new().unwrap();
        let (mut session, _outbound) = manager(&dir).connect();
        let (_frames, mut inbound): (Frames, _) = unbounded();

        let finished = tokio::time::timeout(
            Duration::from_millis(200),
            receive_loop(&mut inbound, &mut session, None),
        )
        .await;
        assert!(finished.is_err());
    }

    #[tokio::test]
    async fn receive_loop_ends_when_peer_goes_away() {
        let dir = TempDir::new().unwrap();
        let (mut session, _outbound) = manager(&dir).connect();
        let (frames, mut inbound): (Frames, _) = unbounded();
        drop(frames);

        receive_loop(&mut inbound, &mut session, None).await;
        assert!(!session.state().is_identified());
    }

    #[tokio::test]
    async fn plain_get_is_not_upgraded() {
        let dir = TempDir::new().unwrap();
        let response = websocket_router(state(&dir))
            .oneshot(Request::get("/ws/project").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
    }
}
