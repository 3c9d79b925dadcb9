//! Who sent a message, or whom to treat as its sender.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sender identity carried in the `identity-type` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityType {
    /// A running program, bound to one run id.
    Cli,
    /// A dashboard frontend, interested in a whole project.
    Web,
    /// The relay itself (handshake replies).
    Server,
    /// Anything else a peer put on the wire.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for IdentityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdentityType::Cli => "cli",
            IdentityType::Web => "web",
            IdentityType::Server => "server",
            IdentityType::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
