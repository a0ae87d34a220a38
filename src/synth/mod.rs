//! Commit-Log Event Synthesizer
//!
//! Rebuilds OpenLineage RunEvents from Delta transaction logs for jobs that
//! never emitted one. Each commit under `<table>/_delta_log/*.json` becomes a
//! COMPLETE event with the table as its single output, written back into the
//! same container under the output prefix.
//!
//! With [`SynthNaming::Deterministic`] the output name depends only on the
//! table and commit, so repeated scans overwrite the same blobs instead of
//! piling up copies.

pub mod commit_log;

pub use commit_log::{parse_commit_entry, CommitEntry};

use crate::config::SynthConfig;
use crate::error::{LineageError, Result};
use crate::model::{Dataset, EventMetadataRecord, EventType, Job, Run, RunEvent, OPENLINEAGE_SCHEMA_URL};
use crate::store::{BlobStore, MetadataStore};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_OUTPUT_PREFIX: &str = "deltatable_events/";
pub const PRODUCER: &str = "deltatable-lineage-function";

const DELTA_LOG_MARKER: &str = "/_delta_log/";
const COMMIT_SUFFIX: &str = ".json";

/// How synthesized event blobs are named
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthNaming {
    /// `{runId}_{tableName}_{hash}.json`, stable across scans
    Deterministic,
    /// `{runId}_{tableName}_{YYYYMMDDHHMMSS}.json`
    Timestamped,
}

impl FromStr for SynthNaming {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deterministic" | "hash" => Ok(SynthNaming::Deterministic),
            "timestamped" | "timestamp" => Ok(SynthNaming::Timestamped),
            other => Err(format!("unknown synthesized file naming '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: String,
}

/// What one scan found and did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisReport {
    pub tables: Vec<String>,
    pub written: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
    /// Synthesized events newly registered as `Unprocessed`
    pub registered: usize,
}

struct Registry {
    store: Arc<dyn MetadataStore>,
    team_name: String,
}

pub struct CommitLogSynthesizer {
    blobs: Arc<dyn BlobStore>,
    container: String,
    output_prefix: String,
    dataset_namespace: String,
    job_namespace: String,
    naming: SynthNaming,
    registry: Option<Registry>,
}

/// `orders/bronze` -> `orders_bronze`
pub fn table_name(table_path: &str) -> String {
    table_path.replace('/', "_")
}

fn entry_stem(entry_name: &str) -> &str {
    let base = entry_name.rsplit('/').next().unwrap_or(entry_name);
    base.strip_suffix(COMMIT_SUFFIX).unwrap_or(base)
}

impl CommitLogSynthesizer {
    pub fn new(blobs: Arc<dyn BlobStore>, config: &SynthConfig) -> Self {
        Self {
            blobs,
            container: config.container.clone(),
            output_prefix: config.output_prefix.clone(),
            dataset_namespace: format!(
                "abfss://{}@{}.dfs.core.windows.net",
                config.container, config.storage_account
            ),
            job_namespace: config.job_namespace.clone(),
            naming: config.naming,
            registry: None,
        }
    }

    /// Also open an `Unprocessed` tracking record for every written event, so
    /// the processor picks synthesized events up like native ones.
    pub fn with_registration(mut self, store: Arc<dyn MetadataStore>, team_name: impl Into<String>) -> Self {
        self.registry = Some(Registry {
            store,
            team_name: team_name.into(),
        });
        self
    }

    /// Distinct table paths that own a `_delta_log/` directory, sorted
    pub fn discover_tables(&self) -> Result<Vec<String>> {
        let names = self.blobs.list(&self.container, "")?;
        let tables: BTreeSet<String> = names
            .iter()
            .filter(|name| self.output_prefix.is_empty() || !name.starts_with(&self.output_prefix))
            .filter(|name| name.ends_with(COMMIT_SUFFIX))
            .filter_map(|name| name.split_once(DELTA_LOG_MARKER).map(|(table, _)| table.to_string()))
            .filter(|table| !table.is_empty())
            .collect();
        Ok(tables.into_iter().collect())
    }

    /// Commit files of one table in version order
    pub fn commit_entries(&self, table_path: &str) -> Result<Vec<String>> {
        let prefix = format!("{}{}", table_path, DELTA_LOG_MARKER);
        let names = self.blobs.list(&self.container, &prefix)?;
        Ok(names
            .into_iter()
            .filter(|name| {
                let rest = &name[prefix.len()..];
                !rest.contains('/') && rest.ends_with(COMMIT_SUFFIX)
            })
            .collect())
    }

    pub fn synthesize(&self, table_path: &str, entry_name: &str, entry: &CommitEntry, now: DateTime<Utc>) -> RunEvent {
        let event_time = entry
            .timestamp_ms()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or(now);
        let run_id = entry.commit_id().unwrap_or_else(|| entry_stem(entry_name).to_string());

        let mut facets = Map::new();
        facets.insert("delta_operation".to_string(), json!({ "operation": entry.operation() }));

        let namespace = Some(self.dataset_namespace.clone());
        RunEvent {
            event_type: EventType::Complete,
            event_time: Some(event_time.to_rfc3339_opts(SecondsFormat::Millis, true)),
            producer: Some(PRODUCER.to_string()),
            schema_url: Some(OPENLINEAGE_SCHEMA_URL.to_string()),
            run: Run {
                run_id: Some(run_id),
                facets,
            },
            job: Job {
                namespace: Some(self.job_namespace.clone()),
                name: table_name(table_path),
                facets: Map::new(),
            },
            inputs: entry
                .reads
                .iter()
                .map(|path| Dataset::named(namespace.clone(), path.clone()))
                .collect(),
            outputs: vec![Dataset::named(namespace, table_path)],
            extra: Map::new(),
        }
    }

    /// Blob name (including the output prefix) for a synthesized event
    pub fn output_name(&self, run_id: &str, table_name: &str, now: DateTime<Utc>) -> String {
        let suffix = match self.naming {
            SynthNaming::Deterministic => {
                let digest = blake3::hash(format!("{}\n{}", table_name, run_id).as_bytes());
                digest.to_hex().as_str()[..16].to_string()
            }
            SynthNaming::Timestamped => now.format("%Y%m%d%H%M%S").to_string(),
        };
        format!("{}{}_{}_{}.json", self.output_prefix, run_id, table_name, suffix)
    }

    /// One pass over the whole container.
    ///
    /// Only a failure to list the container aborts the pass. A table whose log
    /// cannot be listed, or a commit that cannot be read or parsed, is logged
    /// and recorded in `skipped`.
    pub fn scan(&self, now: DateTime<Utc>) -> Result<SynthesisReport> {
        if let Some(registry) = &self.registry {
            registry.store.ensure_tables()?;
        }

        let tables = self.discover_tables()?;
        info!(container = %self.container, tables = tables.len(), "Discovered delta tables");

        let mut report = SynthesisReport {
            tables: tables.clone(),
            ..SynthesisReport::default()
        };

        for table in &tables {
            let entries = match self.commit_entries(table) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(table = %table, error = %e, "Cannot list commit log");
                    report.skipped.push(SkippedEntry {
                        name: format!("{}{}", table, DELTA_LOG_MARKER),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            for entry_name in entries {
                match self.synthesize_entry(table, &entry_name, now) {
                    Ok((output, registered)) => {
                        if registered {
                            report.registered += 1;
                        }
                        report.written.push(output);
                    }
                    Err(e) => {
                        warn!(entry = %entry_name, error = %e, "Skipping commit log entry");
                        report.skipped.push(SkippedEntry {
                            name: entry_name,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            written = report.written.len(),
            skipped = report.skipped.len(),
            registered = report.registered,
            "Commit log synthesis finished"
        );
        Ok(report)
    }

    fn synthesize_entry(&self, table_path: &str, entry_name: &str, now: DateTime<Utc>) -> Result<(String, bool)> {
        let bytes = self.blobs.read(&self.container, entry_name)?;
        let entry = parse_commit_entry(&bytes)?;
        let event = self.synthesize(table_path, entry_name, &entry, now);

        let run_id = event
            .run_id()
            .ok_or_else(|| LineageError::Parse(format!("no run id for {}", entry_name)))?;
        let output = self.output_name(run_id, &event.job.name, now);
        let payload = serde_json::to_vec_pretty(&event)?;
        self.blobs.write(&self.container, &output, &payload)?;
        info!(entry = %entry_name, output = %output, "Synthesized lineage event");

        let registered = self.register(&output)?;
        Ok((output, registered))
    }

    fn register(&self, output: &str) -> Result<bool> {
        let Some(registry) = &self.registry else {
            return Ok(false);
        };
        if registry.store.get_event(&registry.team_name, output)?.is_some() {
            return Ok(false);
        }
        let file_path = format!("{}/{}", self.container, output);
        registry
            .store
            .insert_event(&EventMetadataRecord::unprocessed(&registry.team_name, output, &file_path))?;
        Ok(true)
    }
}
