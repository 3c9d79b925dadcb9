//! Timestamp value object for immutable points in time.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire and storage format of event timestamps (microsecond precision).
pub const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Immutable point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Formats the timestamp the way events carry it on the wire.
    ///
    /// The format sorts lexicographically in time order, which the
    /// history store relies on for timestamp range queries.
    pub fn to_wire(&self) -> String {
        self.0.format(WIRE_FORMAT).to_string()
    }

    /// Parses a wire-format timestamp.
    pub fn parse_wire(s: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(s, WIRE_FORMAT)
            .ok()
            .map(|naive| Self(naive.and_utc()))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}
