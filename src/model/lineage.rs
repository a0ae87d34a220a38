//! Canonical lineage shapes shared by the extractor, the sink and the store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Which side of the process a dataset sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two endpoint kinds the catalog knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// Storage dataset (lakehouse)
    Dataset,
    /// Compute process (notebook / job)
    Process,
}

impl EndpointKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EndpointKind::Dataset => "fabric_lakehouse",
            EndpointKind::Process => "fabric_synapse_notebook",
        }
    }

    /// Path segment used when building the endpoint's qualified name
    pub fn path_segment(&self) -> &'static str {
        match self {
            EndpointKind::Dataset => "lakehouses",
            EndpointKind::Process => "synapsenotebooks",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub kind: EndpointKind,
    /// `None` when the event carried no process identity
    pub guid: Option<String>,
}

/// Directed edge sent to the catalog; never persisted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRelationship {
    pub direction: Direction,
    pub source: Endpoint,
    pub target: Endpoint,
    pub workspace_id: Option<String>,
}

impl CatalogRelationship {
    /// dataset -> process
    pub fn input(dataset_guid: &str, process_guid: Option<&str>, workspace_id: Option<&str>) -> Self {
        Self {
            direction: Direction::Input,
            source: Endpoint {
                kind: EndpointKind::Dataset,
                guid: Some(dataset_guid.to_string()),
            },
            target: Endpoint {
                kind: EndpointKind::Process,
                guid: process_guid.map(str::to_string),
            },
            workspace_id: workspace_id.map(str::to_string),
        }
    }

    /// process -> dataset
    pub fn output(process_guid: Option<&str>, dataset_guid: &str, workspace_id: Option<&str>) -> Self {
        Self {
            direction: Direction::Output,
            source: Endpoint {
                kind: EndpointKind::Process,
                guid: process_guid.map(str::to_string),
            },
            target: Endpoint {
                kind: EndpointKind::Dataset,
                guid: Some(dataset_guid.to_string()),
            },
            workspace_id: workspace_id.map(str::to_string),
        }
    }
}

/// How a dataset path was qualified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    File,
    Table,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetLocation {
    pub guid: String,
    pub table_name: String,
    pub kind: TableKind,
}

/// Everything derived from one RunEvent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageFact {
    pub process_name: String,
    pub intermediate_process_id: Option<String>,
    pub workspace_id: Option<String>,
    pub inputs: Vec<DatasetLocation>,
    pub outputs: Vec<DatasetLocation>,
    pub input_columns: Vec<String>,
    pub output_columns: Vec<String>,
    /// Output column -> source columns, merged across output datasets
    pub derived_columns: BTreeMap<String, Vec<String>>,
    pub join_conditions: Vec<Value>,
    pub is_delta: bool,
}

impl LineageFact {
    pub fn input_dataset_ids(&self) -> Vec<String> {
        self.inputs.iter().map(|d| d.guid.clone()).collect()
    }

    pub fn output_dataset_ids(&self) -> Vec<String> {
        self.outputs.iter().map(|d| d.guid.clone()).collect()
    }

    pub fn input_tables(&self) -> String {
        join_table_names(&self.inputs)
    }

    pub fn output_tables(&self) -> String {
        join_table_names(&self.outputs)
    }

    pub fn input_table_kinds(&self) -> Vec<TableKind> {
        self.inputs.iter().map(|d| d.kind).collect()
    }

    pub fn output_table_kinds(&self) -> Vec<TableKind> {
        self.outputs.iter().map(|d| d.kind).collect()
    }

    /// One relationship per input dataset, then one per output dataset
    pub fn relationships(&self) -> Vec<CatalogRelationship> {
        let process = self.intermediate_process_id.as_deref();
        let workspace = self.workspace_id.as_deref();

        let inputs = self
            .inputs
            .iter()
            .map(|ds| CatalogRelationship::input(&ds.guid, process, workspace));
        let outputs = self
            .outputs
            .iter()
            .map(|ds| CatalogRelationship::output(process, &ds.guid, workspace));

        inputs.chain(outputs).collect()
    }
}

fn join_table_names(locations: &[DatasetLocation]) -> String {
    locations
        .iter()
        .map(|d| d.table_name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
