//! SQLite-backed metadata tables

use crate::error::{LineageError, Result};
use crate::model::{DetailWrite, EventMetadataRecord, EventStatus, LineageDetailRecord};
use crate::store::MetadataStore;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const EVENT_COLUMNS: &str = "team_name, file_name, status, message, retry_count, file_path, is_archived";

const DETAIL_COLUMNS: &str = "team_name, file_name, process_name, input_datasets, output_datasets, \
     intermediate_process, input_tables, output_tables, input_columns, output_columns, \
     derived_columns, join_conditions, is_delta, created_at, input_table_kinds, output_table_kinds";

pub struct SqliteMetadataStore {
    db: Mutex<Connection>,
}

impl SqliteMetadataStore {
    /// Open (or create) the database file and its tables
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Connection::open(path)
            .map_err(|e| LineageError::Store(format!("Failed to open metadata database: {}", e)))?;
        info!(path = %path.display(), "Opened metadata database");
        Self::with_connection(db)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        let store = Self { db: Mutex::new(db) };
        store.ensure_tables()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| LineageError::Store("metadata connection lock poisoned".to_string()))
    }
}

/// Row shape before the status text is validated
struct RawEvent {
    team_name: String,
    file_name: String,
    status: String,
    message: String,
    retry_count: i64,
    file_path: String,
    is_archived: bool,
}

impl RawEvent {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            team_name: row.get(0)?,
            file_name: row.get(1)?,
            status: row.get(2)?,
            message: row.get(3)?,
            retry_count: row.get(4)?,
            file_path: row.get(5)?,
            is_archived: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<EventMetadataRecord> {
        Ok(EventMetadataRecord {
            status: self.status.parse()?,
            team_name: self.team_name,
            file_name: self.file_name,
            message: self.message,
            retry_count: self.retry_count,
            file_path: self.file_path,
            is_archived: self.is_archived,
        })
    }
}

struct RawDetail {
    team_name: String,
    file_name: String,
    process_name: String,
    input_datasets: String,
    output_datasets: String,
    intermediate_process: Option<String>,
    input_tables: String,
    output_tables: String,
    input_columns: String,
    output_columns: String,
    derived_columns: String,
    join_conditions: String,
    is_delta: bool,
    created_at: String,
    input_table_kinds: String,
    output_table_kinds: String,
}

impl RawDetail {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            team_name: row.get(0)?,
            file_name: row.get(1)?,
            process_name: row.get(2)?,
            input_datasets: row.get(3)?,
            output_datasets: row.get(4)?,
            intermediate_process: row.get(5)?,
            input_tables: row.get(6)?,
            output_tables: row.get(7)?,
            input_columns: row.get(8)?,
            output_columns: row.get(9)?,
            derived_columns: row.get(10)?,
            join_conditions: row.get(11)?,
            is_delta: row.get(12)?,
            created_at: row.get(13)?,
            input_table_kinds: row.get(14)?,
            output_table_kinds: row.get(15)?,
        })
    }

    fn into_record(self) -> Result<LineageDetailRecord> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| LineageError::Store(format!("bad created_at '{}': {}", self.created_at, e)))?
            .with_timezone(&Utc);
        Ok(LineageDetailRecord {
            team_name: self.team_name,
            file_name: self.file_name,
            process_name: self.process_name,
            input_datasets: decode(&self.input_datasets)?,
            output_datasets: decode(&self.output_datasets)?,
            intermediate_process: self.intermediate_process,
            input_tables: self.input_tables,
            output_tables: self.output_tables,
            input_table_kinds: decode(&self.input_table_kinds)?,
            output_table_kinds: decode(&self.output_table_kinds)?,
            input_columns: decode(&self.input_columns)?,
            output_columns: decode(&self.output_columns)?,
            derived_columns: decode(&self.derived_columns)?,
            join_conditions: decode(&self.join_conditions)?,
            is_delta: self.is_delta,
            created_at,
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| LineageError::Store(format!("corrupt detail column: {}", e)))
}

impl MetadataStore for SqliteMetadataStore {
    fn ensure_tables(&self) -> Result<()> {
        let db = self.conn()?;
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS event_metadata (
                team_name TEXT NOT NULL,
                file_name TEXT NOT NULL,
                status TEXT NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                retry_count INTEGER NOT NULL DEFAULT 3,
                file_path TEXT NOT NULL,
                is_archived INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (team_name, file_name)
            );
            CREATE INDEX IF NOT EXISTS idx_event_metadata_status ON event_metadata(team_name, status);
            CREATE TABLE IF NOT EXISTS lineage_details (
                team_name TEXT NOT NULL,
                file_name TEXT NOT NULL,
                process_name TEXT NOT NULL,
                input_datasets TEXT NOT NULL,
                output_datasets TEXT NOT NULL,
                intermediate_process TEXT,
                input_tables TEXT NOT NULL,
                output_tables TEXT NOT NULL,
                input_columns TEXT NOT NULL,
                output_columns TEXT NOT NULL,
                derived_columns TEXT NOT NULL,
                join_conditions TEXT NOT NULL,
                is_delta INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                input_table_kinds TEXT NOT NULL DEFAULT '[]',
                output_table_kinds TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (team_name, file_name)
            );
            "#,
        )
        .map_err(|e| LineageError::Store(format!("Failed to create tables: {}", e)))?;
        Ok(())
    }

    fn insert_event(&self, record: &EventMetadataRecord) -> Result<()> {
        let db = self.conn()?;
        db.execute(
            &format!("INSERT INTO event_metadata ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)", EVENT_COLUMNS),
            params![
                record.team_name,
                record.file_name,
                record.status.as_str(),
                record.message,
                record.retry_count,
                record.file_path,
                record.is_archived,
            ],
        )
        .map_err(|e| {
            LineageError::Store(format!(
                "Failed to insert event metadata {}/{}: {}",
                record.team_name, record.file_name, e
            ))
        })?;
        debug!(team = %record.team_name, file_name = %record.file_name, "Inserted event metadata");
        Ok(())
    }

    fn get_event(&self, team_name: &str, file_name: &str) -> Result<Option<EventMetadataRecord>> {
        let db = self.conn()?;
        let raw = db
            .query_row(
                &format!(
                    "SELECT {} FROM event_metadata WHERE team_name = ?1 AND file_name = ?2",
                    EVENT_COLUMNS
                ),
                params![team_name, file_name],
                RawEvent::from_row,
            )
            .optional()?;
        raw.map(RawEvent::into_record).transpose()
    }

    fn merge_status(&self, team_name: &str, file_name: &str, status: EventStatus, message: &str) -> Result<()> {
        let db = self.conn()?;
        let changed = db.execute(
            "UPDATE event_metadata SET status = ?3, message = ?4 WHERE team_name = ?1 AND file_name = ?2",
            params![team_name, file_name, status.as_str(), message],
        )?;
        if changed == 0 {
            return Err(LineageError::Store(format!(
                "no event metadata for {}/{}",
                team_name, file_name
            )));
        }
        Ok(())
    }

    fn list_events(&self, team_name: &str, status: Option<EventStatus>) -> Result<Vec<EventMetadataRecord>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM event_metadata WHERE team_name = ?1 AND (?2 IS NULL OR status = ?2) ORDER BY file_name",
            EVENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![team_name, status.map(|s| s.as_str())], RawEvent::from_row)?;

        let mut records = Vec::new();
        for raw in rows {
            records.push(raw?.into_record()?);
        }
        Ok(records)
    }

    fn insert_detail(&self, record: &LineageDetailRecord) -> Result<DetailWrite> {
        let db = self.conn()?;
        let inserted = db.execute(
            &format!(
                "INSERT OR IGNORE INTO lineage_details ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                DETAIL_COLUMNS
            ),
            params![
                record.team_name,
                record.file_name,
                record.process_name,
                serde_json::to_string(&record.input_datasets)?,
                serde_json::to_string(&record.output_datasets)?,
                record.intermediate_process,
                record.input_tables,
                record.output_tables,
                serde_json::to_string(&record.input_columns)?,
                serde_json::to_string(&record.output_columns)?,
                serde_json::to_string(&record.derived_columns)?,
                serde_json::to_string(&record.join_conditions)?,
                record.is_delta,
                record.created_at.to_rfc3339(),
                serde_json::to_string(&record.input_table_kinds)?,
                serde_json::to_string(&record.output_table_kinds)?,
            ],
        )?;

        if inserted == 0 {
            Ok(DetailWrite::AlreadyPresent)
        } else {
            Ok(DetailWrite::Created)
        }
    }

    fn get_detail(&self, team_name: &str, file_name: &str) -> Result<Option<LineageDetailRecord>> {
        let db = self.conn()?;
        let raw = db
            .query_row(
                &format!(
                    "SELECT {} FROM lineage_details WHERE team_name = ?1 AND file_name = ?2",
                    DETAIL_COLUMNS
                ),
                params![team_name, file_name],
                RawDetail::from_row,
            )
            .optional()?;
        raw.map(RawDetail::into_record).transpose()
    }
}
