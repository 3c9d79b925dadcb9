//! Filter/paginate conditions for history reads.
//!
//! Parsed from the JSON condition object the read API accepts:
//!
//! ```text
//! {
//!   "id":        [from, to] | id,
//!   "timestamp": [from, to] | from,
//!   "series":    "loss",
//!   "runid":     "run-1",
//!   "limit":     100,
//!   "order":     {"id": "DESC"}
//! }
//! ```

use serde_json::Value;

use crate::domain::foundation::{RunId, ValidationError};

/// Row id filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdFilter {
    Exact(i64),
    /// Inclusive range.
    Between(i64, i64),
}

/// Timestamp filter over wire-format strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampFilter {
    /// Everything at or after the bound.
    From(String),
    /// Inclusive range.
    Between(String, String),
}

/// Columns a history read may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Timestamp,
    Series,
    RunId,
}

impl SortColumn {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "id" => Some(SortColumn::Id),
            "timestamp" => Some(SortColumn::Timestamp),
            "series" => Some(SortColumn::Series),
            "runid" | "run_id" => Some(SortColumn::RunId),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "ASC" => Some(SortDirection::Asc),
            "DESC" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Condition for `read_events` / `read_blobs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryCondition {
    pub id: Option<IdFilter>,
    pub timestamp: Option<TimestampFilter>,
    pub series: Option<String>,
    pub run_id: Option<RunId>,
    pub limit: Option<u32>,
    pub order: Vec<(SortColumn, SortDirection)>,
}

impl QueryCondition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(IdFilter::Exact(id));
        self
    }

    pub fn with_id_range(mut self, from: i64, to: i64) -> Self {
        self.id = Some(IdFilter::Between(from, to));
        self
    }

    pub fn with_timestamp_range(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.timestamp = Some(TimestampFilter::Between(from.into(), to.into()));
        self
    }

    pub fn with_series(mut self, series: impl Into<String>) -> Self {
        self.series = Some(series.into());
        self
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn order_by(mut self, column: SortColumn, direction: SortDirection) -> Self {
        self.order.push((column, direction));
        self
    }

    /// Parses a condition from its JSON text. Empty text means no condition.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ValidationError::invalid_format("condition", e.to_string()))?;
        Self::from_json(&value)
    }

    /// Builds a condition from a parsed JSON object.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let object = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(object) => object,
            _ => {
                return Err(ValidationError::invalid_format(
                    "condition",
                    "expected a JSON object",
                ))
            }
        };

        let mut condition = Self::default();

        if let Some(id) = object.get("id").filter(|v| !v.is_null()) {
            condition.id = Some(parse_id_filter(&unquote(id)?)?);
        }
        if let Some(ts) = object.get("timestamp").filter(|v| !v.is_null()) {
            condition.timestamp = Some(parse_timestamp_filter(&unquote(ts)?)?);
        }
        if let Some(series) = object.get("series").filter(|v| !v.is_null()) {
            let series = series.as_str().ok_or_else(|| {
                ValidationError::invalid_format("series", "expected a string")
            })?;
            condition.series = Some(series.to_string());
        }
        if let Some(run_id) = object
            .get("runid")
            .or_else(|| object.get("run_id"))
            .filter(|v| !v.is_null())
        {
            let run_id = run_id.as_str().ok_or_else(|| {
                ValidationError::invalid_format("runid", "expected a string")
            })?;
            condition.run_id = Some(RunId::new(run_id)?);
        }
        if let Some(limit) = object.get("limit").filter(|v| !v.is_null()) {
            let limit = limit
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| {
                    ValidationError::invalid_format("limit", "expected a non-negative integer")
                })?;
            condition.limit = Some(limit);
        }
        if let Some(order) = object.get("order").filter(|v| !v.is_null()) {
            let order = order.as_object().ok_or_else(|| {
                ValidationError::invalid_format("order", "expected {column: \"ASC\"|\"DESC\"}")
            })?;
            for (column, direction) in order {
                let column = SortColumn::parse(column).ok_or_else(|| {
                    ValidationError::invalid_format("order", format!("unknown column '{}'", column))
                })?;
                let direction = direction
                    .as_str()
                    .and_then(SortDirection::parse)
                    .ok_or_else(|| {
                        ValidationError::invalid_format("order", "direction must be ASC or DESC")
                    })?;
                condition.order.push((column, direction));
            }
        }

        Ok(condition)
    }
}

/// Clients sometimes send ranges as strings holding JSON (`"[1, 5]"`).
fn unquote(value: &Value) -> Result<Value, ValidationError> {
    match value {
        Value::String(s) if s.trim_start().starts_with('[') => serde_json::from_str(s)
            .map_err(|e| ValidationError::invalid_format("condition", e.to_string())),
        Value::String(s) if s.trim().parse::<i64>().is_ok() => {
            Ok(Value::from(s.trim().parse::<i64>().unwrap_or_default()))
        }
        other => Ok(other.clone()),
    }
}

fn parse_id_filter(value: &Value) -> Result<IdFilter, ValidationError> {
    if let Some(id) = value.as_i64() {
        return Ok(IdFilter::Exact(id));
    }
    match value.as_array().map(|a| a.as_slice()) {
        Some([from, to]) => match (from.as_i64(), to.as_i64()) {
            (Some(from), Some(to)) => Ok(IdFilter::Between(from, to)),
            _ => Err(ValidationError::invalid_format(
                "id",
                "range bounds must be integers",
            )),
        },
        _ => Err(ValidationError::invalid_format(
            "id",
            "expected an integer or [from, to]",
        )),
    }
}

fn parse_timestamp_filter(value: &Value) -> Result<TimestampFilter, ValidationError> {
    if let Some(from) = value.as_str() {
        return Ok(TimestampFilter::From(from.to_string()));
    }
    match value.as_array().map(|a| a.as_slice()) {
        Some([from, to]) => match (from.as_str(), to.as_str()) {
            (Some(from), Some(to)) => Ok(TimestampFilter::Between(from.to_string(), to.to_string())),
            _ => Err(ValidationError::invalid_format(
                "timestamp",
                "range bounds must be strings",
            )),
        },
        _ => Err(ValidationError::invalid_format(
            "timestamp",
            "expected a string or [from, to]",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_text_is_no_condition() {
        assert_eq!(QueryCondition::parse("").unwrap(), QueryCondition::default());
        assert_eq!(QueryCondition::parse("{}").unwrap(), QueryCondition::default());
    }

    #[test]
    fn parses_every_field() {
        let condition = QueryCondition::from_json(&json!({
            "id": [3, 9],
            "timestamp": ["2024-01-01T00:00:00.000000", "2024-02-01T00:00:00.000000"],
            "series": "loss",
            "runid": "run-1",
            "limit": 50,
            "order": {"timestamp": "DESC", "id": "asc"}
        }))
        .unwrap();

        assert_eq!(condition.id, Some(IdFilter::Between(3, 9)));
        assert!(matches!(condition.timestamp, Some(TimestampFilter::Between(_, _))));
        assert_eq!(condition.series.as_deref(), Some("loss"));
        assert_eq!(condition.run_id.unwrap().as_str(), "run-1");
        assert_eq!(condition.limit, Some(50));
        assert_eq!(
            condition.order,
            vec![
                (SortColumn::Timestamp, SortDirection::Desc),
                (SortColumn::Id, SortDirection::Asc)
            ]
        );
    }

    #[test]
    fn single_values_become_exact_or_lower_bound() {
        let condition = QueryCondition::from_json(&json!({
            "id": 4,
            "timestamp": "2024-01-01T00:00:00.000000"
        }))
        .unwrap();
        assert_eq!(condition.id, Some(IdFilter::Exact(4)));
        assert_eq!(
            condition.timestamp,
            Some(TimestampFilter::From("2024-01-01T00:00:00.000000".to_string()))
        );
    }

    #[test]
    fn string_encoded_ranges_are_accepted() {
        let condition = QueryCondition::from_json(&json!({"id": "[1, 2]"})).unwrap();
        assert_eq!(condition.id, Some(IdFilter::Between(1, 2)));
    }

    #[test]
    fn run_id_alias_is_accepted() {
        let condition = QueryCondition::from_json(&json!({"run_id": "r"})).unwrap();
        assert_eq!(condition.run_id.unwrap().as_str(), "r");
    }

    #[test]
    fn unknown_order_column_is_rejected() {
        let result = QueryCondition::from_json(&json!({"order": {"json; DROP TABLE x": "ASC"}}));
        assert!(result.is_err());
    }

    #[test]
    fn bad_direction_is_rejected() {
        assert!(QueryCondition::from_json(&json!({"order": {"id": "SIDEWAYS"}})).is_err());
    }

    #[test]
    fn negative_limit_is_rejected() {
        assert!(QueryCondition::from_json(&json!({"limit": -1})).is_err());
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(QueryCondition::from_json(&json!([1, 2])).is_err());
        assert!(QueryCondition::parse("not json").is_err());
    }

    #[test]
    fn malformed_id_range_is_rejected() {
        assert!(QueryCondition::from_json(&json!({"id": [1]})).is_err());
        assert!(QueryCondition::from_json(&json!({"id": ["a", "b"]})).is_err());
    }
}
