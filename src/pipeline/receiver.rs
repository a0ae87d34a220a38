//! Ingest stage: store an inbound RunEvent and open its tracking record

use crate::error::{LineageError, Result};
use crate::model::{EventMetadataRecord, EventType, RunEvent};
use crate::store::{BlobStore, MetadataStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Statement kinds whose COMPLETE events carry useful lineage
pub const DEFAULT_JOB_PATTERNS: &[&str] = &[
    "create_table",
    "create_view_statement",
    "create_table_as_select_statement",
    "insert_into_statement",
    "save_into_data_source_command",
    "merge_into_table",
    "create_gold_table",
    "create_silver_table",
    "create_bronze_table",
];

const NO_NOTEBOOK: &str = "no_notebook";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Accepted { file_name: String, file_path: String },
    Ignored { reason: String },
}

pub struct EventReceiver {
    blobs: Arc<dyn BlobStore>,
    store: Arc<dyn MetadataStore>,
    container: String,
    team_name: String,
    job_patterns: Vec<String>,
}

/// `{runId}_{jobBase}_{YYYYMMDDHHMMSS}.json`
pub fn event_file_name(event: &RunEvent, now: DateTime<Utc>) -> String {
    let run_id = event
        .run_id()
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let job_base = event
        .job
        .name
        .split('.')
        .next()
        .filter(|base| !base.is_empty())
        .unwrap_or(NO_NOTEBOOK);
    format!("{}_{}_{}.json", run_id, job_base, now.format("%Y%m%d%H%M%S"))
}

impl EventReceiver {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        store: Arc<dyn MetadataStore>,
        container: impl Into<String>,
        team_name: impl Into<String>,
    ) -> Self {
        Self {
            blobs,
            store,
            container: container.into(),
            team_name: team_name.into(),
            job_patterns: DEFAULT_JOB_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Empty patterns accept every COMPLETE event
    pub fn with_job_patterns(mut self, patterns: Vec<String>) -> Self {
        self.job_patterns = patterns.into_iter().map(|p| p.to_lowercase()).collect();
        self
    }

    /// Why an event is not worth keeping, if it isn't
    pub fn rejection(&self, event: &RunEvent) -> Option<String> {
        if event.event_type != EventType::Complete {
            return Some(format!("eventType is {:?}, not COMPLETE", event.event_type));
        }
        if self.job_patterns.is_empty() {
            return None;
        }
        let job_name = event.job.name.to_lowercase();
        if job_name.is_empty() || !self.job_patterns.iter().any(|p| job_name.contains(p.as_str())) {
            return Some(format!("job name '{}' matches no lineage statement pattern", event.job.name));
        }
        None
    }

    pub fn receive(&self, payload: &[u8], now: DateTime<Utc>) -> Result<ReceiveOutcome> {
        let event = RunEvent::from_slice(payload)?;

        if let Some(reason) = self.rejection(&event) {
            info!(run_id = ?event.run_id(), reason = %reason, "Ignored inbound event");
            return Ok(ReceiveOutcome::Ignored { reason });
        }

        let file_name = event_file_name(&event, now);
        let file_path = format!("{}/{}", self.container, file_name);

        // Same run, same notebook, same second: the name is taken. Leave the
        // stored payload and its record alone.
        self.store.ensure_tables()?;
        if self.store.get_event(&self.team_name, &file_name)?.is_some() {
            warn!(team = %self.team_name, file_path = %file_path, "Event file name already tracked");
            return Err(LineageError::Store(format!("event {} is already tracked", file_name)));
        }

        self.blobs.write(&self.container, &file_name, payload)?;
        self.store.insert_event(&EventMetadataRecord::unprocessed(
            &self.team_name,
            &file_name,
            &file_path,
        ))?;

        info!(team = %self.team_name, file_path = %file_path, "Stored inbound event");
        Ok(ReceiveOutcome::Accepted { file_name, file_path })
    }
}
