//! The wire envelope relayed between producers and consumers.
//!
//! Every frame on the duplex connection is one JSON object with exactly
//! these keys:
//!
//! ```text
//! projectid, runid, event-type, identity-type, series,
//! payload, event-id, timestamp, history-len, id
//! ```
//!
//! Missing keys take their defaults on parse (`event-id` and
//! `history-len` default to -1, `timestamp` to now). Serialization always
//! emits every key, `null` where absent.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::domain::foundation::{ErrorCode, ProjectId, RunId, Timestamp, ValidationError};

use super::{EventKind, IdentityType};

/// Result code carried by an accepted handshake reply.
pub const RESULT_OK: u16 = 200;

/// One event on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "projectid", default)]
    pub project_id: Option<ProjectId>,

    #[serde(rename = "runid", default)]
    pub run_id: Option<RunId>,

    #[serde(rename = "event-type")]
    pub event_type: String,

    #[serde(rename = "identity-type", default)]
    pub identity_type: Option<IdentityType>,

    #[serde(default)]
    pub series: Option<String>,

    #[serde(default)]
    pub payload: Value,

    #[serde(
        rename = "event-id",
        default = "unset_i64",
        deserialize_with = "null_as_unset"
    )]
    pub event_id: i64,

    #[serde(default = "now_wire", deserialize_with = "null_as_now")]
    pub timestamp: String,

    #[serde(
        rename = "history-len",
        default = "unset_i64",
        deserialize_with = "null_as_unset"
    )]
    pub history_len: i64,

    #[serde(default)]
    pub id: Option<i64>,
}

fn unset_i64() -> i64 {
    -1
}

fn now_wire() -> String {
    Timestamp::now().to_wire()
}

fn null_as_unset<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(-1))
}

fn null_as_now<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(now_wire))
}

impl EventMessage {
    /// Creates a message with defaults for everything but the routing keys.
    pub fn new(event_type: impl Into<String>, identity_type: IdentityType) -> Self {
        Self {
            project_id: None,
            run_id: None,
            event_type: event_type.into(),
            identity_type: Some(identity_type),
            series: None,
            payload: Value::Null,
            event_id: unset_i64(),
            timestamp: now_wire(),
            history_len: unset_i64(),
            id: None,
        }
    }

    pub fn with_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn with_run(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn with_series(mut self, series: impl Into<String>) -> Self {
        self.series = Some(series.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_event_id(mut self, event_id: i64) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn with_history_len(mut self, history_len: i64) -> Self {
        self.history_len = history_len;
        self
    }

    /// Parses one text frame.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(text)
            .map_err(|e| ValidationError::invalid_format("message", e.to_string()))
    }

    /// Serializes to one text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn kind(&self) -> EventKind {
        EventKind::parse(&self.event_type)
    }

    /// Retention limit, if the producer asked for one.
    pub fn retention_limit(&self) -> Option<u32> {
        u32::try_from(self.history_len).ok().filter(|n| *n > 0)
    }

    /// Copy of this message re-addressed from the relay with a new payload.
    pub fn reply(&self, payload: Value) -> Self {
        Self {
            identity_type: Some(IdentityType::Server),
            payload,
            ..self.clone()
        }
    }

    /// Handshake acceptance reply.
    pub fn accepted(&self) -> Self {
        self.reply(json!({ "result": RESULT_OK, "reason": "join success" }))
    }

    /// Handshake rejection reply.
    pub fn rejected(&self, code: ErrorCode, reason: impl Into<String>) -> Self {
        self.reply(json!({ "error": code.status(), "reason": reason.into() }))
    }
}
