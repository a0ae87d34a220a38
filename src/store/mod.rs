//! Storage collaborators
//!
//! The metadata tables (event tracking + lineage details) and the blob storage
//! that holds raw and synthesized events.

pub mod blob;
pub mod sqlite;

pub use blob::{BlobRef, BlobStore, FsBlobStore, MemoryBlobStore};
pub use sqlite::SqliteMetadataStore;

use crate::error::Result;
use crate::model::{DetailWrite, EventMetadataRecord, EventStatus, LineageDetailRecord};

/// Keyed access to event metadata and lineage detail rows.
///
/// Rows are partitioned by team name and keyed by file name.
pub trait MetadataStore: Send + Sync {
    /// Create both tables if they are absent
    fn ensure_tables(&self) -> Result<()>;

    fn insert_event(&self, record: &EventMetadataRecord) -> Result<()>;

    fn get_event(&self, team_name: &str, file_name: &str) -> Result<Option<EventMetadataRecord>>;

    /// Update only status and message; every other column is left as it was.
    fn merge_status(&self, team_name: &str, file_name: &str, status: EventStatus, message: &str) -> Result<()>;

    fn list_events(&self, team_name: &str, status: Option<EventStatus>) -> Result<Vec<EventMetadataRecord>>;

    /// Write-once insert; an existing row is kept and reported as `AlreadyPresent`.
    fn insert_detail(&self, record: &LineageDetailRecord) -> Result<DetailWrite>;

    fn get_detail(&self, team_name: &str, file_name: &str) -> Result<Option<LineageDetailRecord>>;
}
