//! Operational endpoints: liveness probe and remote shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::sync::watch;

/// Delayed shutdown trigger shared by the `/shutdown` route and `main`.
#[derive(Clone)]
pub struct ShutdownTrigger {
    sender: Arc<watch::Sender<bool>>,
    delay: Duration,
}

impl ShutdownTrigger {
    /// Returns the trigger and the receiver the server waits on.
    pub fn new(delay: Duration) -> (Self, watch::Receiver<bool>) {
        let (sender, receiver) = watch::channel(false);
        let trigger = Self {
            sender: Arc::new(sender),
            delay,
        };
        (trigger, receiver)
    }

    /// Fires after the configured delay. Repeated requests are harmless.
    pub fn request(&self) {
        let sender = Arc::clone(&self.sender);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sender.send_replace(true);
        });
    }
}

/// Resolves once a shutdown was requested or every trigger is gone.
pub async fn wait_for_shutdown(mut receiver: watch::Receiver<bool>) {
    while !*receiver.borrow_and_update() {
        if receiver.changed().await.is_err() {
            return;
        }
    }
}

/// GET /hello
pub async fn hello() -> Response {
    (StatusCode::OK, Json(json!({"hello": "hello"}))).into_response()
}

/// POST /shutdown - Answers immediately, stops the server after a delay
pub async fn shutdown(State(trigger): State<ShutdownTrigger>) -> Response {
    tracing::warn!(delay_ms = trigger.delay.as_millis() as u64, "shutdown requested");
    trigger.request();
    (StatusCode::OK, Json(json!({"result": "ok"}))).into_response()
}

pub fn server_routes(trigger: ShutdownTrigger) -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/shutdown", post(shutdown))
        .with_state(trigger)
}
