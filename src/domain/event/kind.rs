//! Event type discriminator.

use std::fmt;

/// Parsed form of the `event-type` key.
///
/// Reserved names get their own variant; anything else is carried
/// verbatim as [`EventKind::Custom`] and takes the generic path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Handshake,
    Status,
    Hyperparams,
    Action,
    Log,
    Image,
    Scalar,
    Progress,
    Hardware,
    Custom(String),
}

impl EventKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "handshake" => EventKind::Handshake,
            "status" => EventKind::Status,
            "hyperparams" | "hyperparameters" => EventKind::Hyperparams,
            "action" => EventKind::Action,
            "log" => EventKind::Log,
            "image" => EventKind::Image,
            "scalar" => EventKind::Scalar,
            "progress" => EventKind::Progress,
            "hardware" => EventKind::Hardware,
            other => EventKind::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Handshake => "handshake",
            EventKind::Status => "status",
            EventKind::Hyperparams => "hyperparams",
            EventKind::Action => "action",
            EventKind::Log => "log",
            EventKind::Image => "image",
            EventKind::Scalar => "scalar",
            EventKind::Progress => "progress",
            EventKind::Hardware => "hardware",
            EventKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
