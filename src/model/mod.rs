//! Canonical Lineage Model
//!
//! Shared data shapes: inbound RunEvents, the derived lineage fact, catalog
//! relationships and the persistent tracking records.

pub mod lineage;
pub mod records;
pub mod run_event;

pub use lineage::{
    CatalogRelationship, DatasetLocation, Direction, Endpoint, EndpointKind, LineageFact, TableKind,
};
pub use records::{
    DetailWrite, EventMetadataRecord, EventStatus, LineageDetailRecord, DEFAULT_RETRY_COUNT,
    SUCCESS_MESSAGE,
};
pub use run_event::{
    ColumnLineageEntry, ColumnLineageFacet, Dataset, DatasetFacets, EventType, InputField, Job, Run,
    RunEvent, SchemaFacet, SchemaField, OPENLINEAGE_SCHEMA_URL,
};
