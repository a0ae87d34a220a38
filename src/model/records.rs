//! Persistent records kept in the metadata tables

use crate::error::LineageError;
use crate::model::lineage::{LineageFact, TableKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_RETRY_COUNT: i64 = 3;
pub const SUCCESS_MESSAGE: &str = "SUCCESS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    Unprocessed,
    Processed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Unprocessed => "Unprocessed",
            EventStatus::Processed => "Processed",
            EventStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, EventStatus::Unprocessed)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unprocessed" => Ok(EventStatus::Unprocessed),
            "Processed" => Ok(EventStatus::Processed),
            "Failed" => Ok(EventStatus::Failed),
            other => Err(LineageError::Store(format!("unknown event status '{}'", other))),
        }
    }
}

/// Tracking row for one received event, keyed by (team_name, file_name)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadataRecord {
    pub team_name: String,
    pub file_name: String,
    pub status: EventStatus,
    pub message: String,
    /// Written at ingest; nothing decrements it
    pub retry_count: i64,
    pub file_path: String,
    pub is_archived: bool,
}

impl EventMetadataRecord {
    /// Fresh record as created by the ingest stage
    pub fn unprocessed(team_name: &str, file_name: &str, file_path: &str) -> Self {
        Self {
            team_name: team_name.to_string(),
            file_name: file_name.to_string(),
            status: EventStatus::Unprocessed,
            message: String::new(),
            retry_count: DEFAULT_RETRY_COUNT,
            file_path: file_path.to_string(),
            is_archived: false,
        }
    }
}

/// Serialized lineage fact for an event that reached `Processed`. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageDetailRecord {
    pub team_name: String,
    pub file_name: String,
    pub process_name: String,
    pub input_datasets: Vec<String>,
    pub output_datasets: Vec<String>,
    pub intermediate_process: Option<String>,
    pub input_tables: String,
    pub output_tables: String,
    /// Kind of each input/output table, in dataset order
    pub input_table_kinds: Vec<TableKind>,
    pub output_table_kinds: Vec<TableKind>,
    pub input_columns: Vec<String>,
    pub output_columns: Vec<String>,
    pub derived_columns: BTreeMap<String, Vec<String>>,
    pub join_conditions: Vec<Value>,
    pub is_delta: bool,
    pub created_at: DateTime<Utc>,
}

impl LineageDetailRecord {
    pub fn from_fact(team_name: &str, file_name: &str, fact: &LineageFact, created_at: DateTime<Utc>) -> Self {
        Self {
            team_name: team_name.to_string(),
            file_name: file_name.to_string(),
            process_name: fact.process_name.clone(),
            input_datasets: fact.input_dataset_ids(),
            output_datasets: fact.output_dataset_ids(),
            intermediate_process: fact.intermediate_process_id.clone(),
            input_tables: fact.input_tables(),
            output_tables: fact.output_tables(),
            input_table_kinds: fact.input_table_kinds(),
            output_table_kinds: fact.output_table_kinds(),
            input_columns: fact.input_columns.clone(),
            output_columns: fact.output_columns.clone(),
            derived_columns: fact.derived_columns.clone(),
            join_conditions: fact.join_conditions.clone(),
            is_delta: fact.is_delta,
            created_at,
        }
    }
}

/// Result of a write-once detail insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailWrite {
    Created,
    AlreadyPresent,
}
