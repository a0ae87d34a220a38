//! OpenLineage RunEvent payloads
//!
//! Only the parts of the event the bridge reads are typed; every other key is
//! kept in a flattened map so a parsed event can be written back out intact.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const OPENLINEAGE_SCHEMA_URL: &str =
    "https://openlineage.io/spec/2-0-2/OpenLineage.json#/$defs/RunEvent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Start,
    Complete,
    Fail,
    #[default]
    #[serde(other)]
    Other,
}

/// One execution of a data-processing job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    #[serde(default)]
    pub event_type: EventType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,

    #[serde(rename = "schemaURL", default, skip_serializing_if = "Option::is_none")]
    pub schema_url: Option<String>,

    #[serde(default)]
    pub run: Run,

    #[serde(default)]
    pub job: Job,

    #[serde(default)]
    pub inputs: Vec<Dataset>,

    #[serde(default)]
    pub outputs: Vec<Dataset>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RunEvent {
    pub fn from_slice(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run.run_id.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    /// Engine-specific metadata (notebook, workspace, operation)
    #[serde(default)]
    pub facets: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub facets: Map<String, Value>,
}

/// A table or file read or written by a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// URI-like name whose second `/` segment is the catalog GUID
    pub name: String,

    #[serde(default)]
    pub facets: DatasetFacets,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub join_columns: Vec<Value>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_delta: bool,
}

impl Dataset {
    pub fn named(namespace: Option<String>, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
            facets: DatasetFacets::default(),
            join_columns: Vec::new(),
            is_delta: false,
        }
    }

    pub fn schema_field_names(&self) -> Vec<String> {
        self.facets
            .schema
            .as_ref()
            .map(|schema| schema.fields.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetFacets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaFacet>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_lineage: Option<ColumnLineageFacet>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaFacet {
    #[serde(default)]
    pub fields: Vec<SchemaField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnLineageFacet {
    /// Output column -> its provenance
    #[serde(default)]
    pub fields: BTreeMap<String, ColumnLineageEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLineageEntry {
    #[serde(default)]
    pub input_fields: Vec<InputField>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Source column reference; engines may omit `field` when provenance is partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}
