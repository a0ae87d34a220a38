//! Dataset/Column Extractor
//!
//! Turns a parsed RunEvent into a `LineageFact`: dataset GUIDs and table names,
//! schema columns, derived-column provenance and the process identity.
//! Extraction is pure; the same event always yields the same fact.

pub mod identity;

pub use identity::{FacetKey, FacetProperties, ProcessIdentity, UNKNOWN_PROCESS};

use crate::error::{LineageError, Result};
use crate::model::{ColumnLineageFacet, Dataset, DatasetLocation, LineageFact, RunEvent, TableKind};
use std::collections::BTreeMap;

pub const UNKNOWN_TABLE: &str = "unknown";

const FILES_COMPONENT: &str = "Files";
const TABLES_COMPONENT: &str = "Tables";

/// Catalog GUID: the second `/`-delimited segment of a dataset name.
pub fn extract_dataset_guid(name: &str) -> Result<String> {
    let mut segments = name.split('/');
    segments.next();
    match segments.next() {
        Some(guid) if !guid.trim().is_empty() => Ok(guid.to_string()),
        _ => Err(LineageError::Parse(format!(
            "malformed dataset URI '{}': expected at least two '/'-delimited segments",
            name
        ))),
    }
}

/// Table or file name of a dataset path.
///
/// Paths with a `Files` or `Tables` component resolve to their last segment.
/// A path holding a single segment below the GUID is that segment. Anything
/// else resolves to `unknown`.
pub fn extract_table_name(name: &str) -> (String, TableKind) {
    let parts: Vec<&str> = name.trim_matches('/').split('/').collect();
    let last = parts.last().copied().unwrap_or_default();

    if parts.contains(&FILES_COMPONENT) {
        return (last.to_string(), TableKind::File);
    }
    if parts.contains(&TABLES_COMPONENT) {
        return (last.to_string(), TableKind::Table);
    }
    if parts.len() == 3 && !last.is_empty() {
        return (last.to_string(), TableKind::Unknown);
    }
    (UNKNOWN_TABLE.to_string(), TableKind::Unknown)
}

/// Output column -> `field` of each input field; entries without a field are skipped.
pub fn extract_derived_columns(facet: &ColumnLineageFacet) -> BTreeMap<String, Vec<String>> {
    facet
        .fields
        .iter()
        .map(|(column, entry)| {
            let sources = entry
                .input_fields
                .iter()
                .filter_map(|input| input.field.clone())
                .collect();
            (column.clone(), sources)
        })
        .collect()
}

fn locate(dataset: &Dataset) -> Result<DatasetLocation> {
    let guid = extract_dataset_guid(&dataset.name)?;
    let (table_name, kind) = extract_table_name(&dataset.name);
    Ok(DatasetLocation { guid, table_name, kind })
}

/// Build the lineage fact for one event.
pub fn extract(event: &RunEvent) -> Result<LineageFact> {
    let identity = ProcessIdentity::from_event(event);

    let mut inputs = Vec::with_capacity(event.inputs.len());
    let mut input_columns = Vec::new();
    for dataset in &event.inputs {
        inputs.push(locate(dataset)?);
        input_columns.extend(dataset.schema_field_names());
    }

    let mut outputs = Vec::with_capacity(event.outputs.len());
    let mut output_columns = Vec::new();
    let mut derived_columns = BTreeMap::new();
    let mut join_conditions = Vec::new();
    let mut is_delta = false;
    for dataset in &event.outputs {
        outputs.push(locate(dataset)?);
        output_columns.extend(dataset.schema_field_names());

        // Later datasets overwrite earlier ones for the same output column.
        if let Some(facet) = &dataset.facets.column_lineage {
            derived_columns.extend(extract_derived_columns(facet));
        }
        join_conditions.extend(dataset.join_columns.iter().cloned());
        is_delta |= dataset.is_delta;
    }

    Ok(LineageFact {
        process_name: identity.process_name,
        intermediate_process_id: identity.process_guid,
        workspace_id: identity.workspace_id,
        inputs,
        outputs,
        input_columns,
        output_columns,
        derived_columns,
        join_conditions,
        is_delta,
    })
}
