//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ValidationError;

const MAX_PROJECT_ID_LEN: usize = 128;
const MAX_RUN_ID_LEN: usize = 256;

/// Tenant key of a tracked project.
///
/// Project ids name store files on disk, so they are restricted to
/// ASCII alphanumerics plus `-`, `_` and `.`, and may not start with a dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    /// Creates a new ProjectId with validation.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::empty_field("projectid"));
        }
        if id.len() > MAX_PROJECT_ID_LEN {
            return Err(ValidationError::too_long("projectid", MAX_PROJECT_ID_LEN));
        }
        if id.starts_with('.') {
            return Err(ValidationError::invalid_format(
                "projectid",
                "must not start with '.'",
            ));
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(ValidationError::invalid_format(
                "projectid",
                format!("illegal character {:?}", c),
            ));
        }
        Ok(Self(id))
    }

    /// Returns the project id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProjectId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ProjectId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> Self {
        id.0
    }
}

/// Identifies one execution of a project, unique within the project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

impl RunId {
    /// Creates a new RunId with validation.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::empty_field("runid"));
        }
        if id.len() > MAX_RUN_ID_LEN {
            return Err(ValidationError::too_long("runid", MAX_RUN_ID_LEN));
        }
        Ok(Self(id))
    }

    /// Returns the run id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RunId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0
    }
}

/// Unique identifier for one duplex connection.
///
/// Generated server-side when a connection is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Creates a new random connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_accepts_file_safe_names() {
        assert!(ProjectId::new("mnist-baseline_v2.1").is_ok());
    }

    #[test]
    fn project_id_rejects_empty() {
        assert!(matches!(
            ProjectId::new("  "),
            Err(ValidationError::EmptyField { .. })
        ));
    }

    #[test]
    fn project_id_rejects_path_components() {
        assert!(ProjectId::new("../etc").is_err());
        assert!(ProjectId::new("a/b").is_err());
        assert!(ProjectId::new(".hidden").is_err());
    }

    #[test]
    fn project_id_rejects_overlong() {
        let long = "p".repeat(MAX_PROJECT_ID_LEN + 1);
        assert!(matches!(
            ProjectId::new(long),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn project_id_deserializes_with_validation() {
        let ok: Result<ProjectId, _> = serde_json::from_str(r#""proj""#);
        assert!(ok.is_ok());
        let bad: Result<ProjectId, _> = serde_json::from_str(r#""a b""#);
        assert!(bad.is_err());
    }

    #[test]
    fn run_id_allows_timestamps() {
        let run = RunId::new("2024-01-16 10:22:01").unwrap();
        assert_eq!(run.as_str(), "2024-01-16 10:22:01");
    }

    #[test]
    fn run_id_rejects_empty() {
        assert!(RunId::new("").is_err());
    }

    #[test]
    fn connection_id_display_is_uuid() {
        let id = ConnectionId::new();
        assert_eq!(format!("{}", id).len(), 36);
        assert_ne!(id, ConnectionId::new());
    }
}
