//! QueryHistoryHandler / ListSeriesHandler - reads over event tables.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::{resolve_bridge, ProjectError};
use crate::application::bridge::BridgeRegistry;
use crate::domain::event::QueryCondition;
use crate::domain::foundation::{ProjectId, RunId};
use crate::ports::EventRow;

/// Event tables the read surface exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryTable {
    Log,
    Hardware,
    Scalar,
    Progress,
}

impl HistoryTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryTable::Log => "log",
            HistoryTable::Hardware => "hardware",
            HistoryTable::Scalar => "scalar",
            HistoryTable::Progress => "progress",
        }
    }
}

impl fmt::Display for HistoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryTable {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "log" => Ok(HistoryTable::Log),
            "hardware" => Ok(HistoryTable::Hardware),
            "scalar" => Ok(HistoryTable::Scalar),
            "progress" => Ok(HistoryTable::Progress),
            other => Err(ProjectError::InvalidRequest(format!(
                "unknown history table '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryHistoryQuery {
    pub project_id: ProjectId,
    pub table: HistoryTable,
    /// Raw JSON condition text; empty means everything.
    pub condition: Option<String>,
}

pub struct QueryHistoryHandler {
    registry: Arc<BridgeRegistry>,
}

impl QueryHistoryHandler {
    pub fn new(registry: Arc<BridgeRegistry>) -> Self {
        Self { registry }
    }

    pub async fn handle(&self, query: QueryHistoryQuery) -> Result<Vec<EventRow>, ProjectError> {
        let bridge = resolve_bridge(&self.registry, &query.project_id).await?;
        let condition = parse_condition(query.condition.as_deref())?;
        let rows = bridge
            .store()
            .read_events(query.table.as_str(), &condition)
            .await?;
        Ok(rows)
    }
}

pub(super) fn parse_condition(text: Option<&str>) -> Result<QueryCondition, ProjectError> {
    QueryCondition::parse(text.unwrap_or_default())
        .map_err(|e| ProjectError::InvalidCondition(e.to_string()))
}

/// Distinct series names of a table, optionally for one run.
#[derive(Debug, Clone)]
pub struct ListSeriesQuery {
    pub project_id: ProjectId,
    pub table: String,
    pub run_id: Option<RunId>,
}

pub struct ListSeriesHandler {
    registry: Arc<BridgeRegistry>,
}

impl ListSeriesHandler {
    pub fn new(registry: Arc<BridgeRegistry>) -> Self {
        Self { registry }
    }

    pub async fn handle(&self, query: ListSeriesQuery) -> Result<Vec<String>, ProjectError> {
        let bridge = resolve_bridge(&self.registry, &query.project_id).await?;
        let series = bridge
            .store()
            .series_of(&query.table, query.run_id.as_ref())
            .await?;
        Ok(series)
    }
}
