//! Process identity carried in engine-specific run facets

use crate::model::RunEvent;
use serde_json::{Map, Value};

pub const UNKNOWN_PROCESS: &str = "Unknown Process";

const SPARK_PROPERTIES_FACET: &str = "spark_properties";
const PROPERTIES_KEY: &str = "properties";

/// Well-known facet property keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetKey {
    /// GUID of the notebook / job artifact
    ArtifactId,
    /// Catalog workspace the artifact lives in
    ArtifactWorkspaceId,
    /// Display name of the notebook
    NotebookName,
}

impl FacetKey {
    pub fn key(&self) -> &'static str {
        match self {
            FacetKey::ArtifactId => "trident.artifact.id",
            FacetKey::ArtifactWorkspaceId => "trident.artifact.workspace.id",
            FacetKey::NotebookName => "spark.synapse.context.notebookname",
        }
    }
}

/// Typed view over `run.facets.spark_properties.properties`
#[derive(Debug, Clone, Copy)]
pub struct FacetProperties<'a> {
    properties: Option<&'a Map<String, Value>>,
}

impl<'a> FacetProperties<'a> {
    pub fn of(event: &'a RunEvent) -> Self {
        let properties = event
            .run
            .facets
            .get(SPARK_PROPERTIES_FACET)
            .and_then(|facet| facet.get(PROPERTIES_KEY))
            .and_then(Value::as_object);
        Self { properties }
    }

    /// Blank strings count as absent.
    pub fn get(&self, key: FacetKey) -> Option<&'a str> {
        self.properties?
            .get(key.key())
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub process_guid: Option<String>,
    pub workspace_id: Option<String>,
    pub process_name: String,
}

impl ProcessIdentity {
    pub fn from_event(event: &RunEvent) -> Self {
        let props = FacetProperties::of(event);
        Self {
            process_guid: props.get(FacetKey::ArtifactId).map(str::to_string),
            workspace_id: props.get(FacetKey::ArtifactWorkspaceId).map(str::to_string),
            process_name: props
                .get(FacetKey::NotebookName)
                .unwrap_or(UNKNOWN_PROCESS)
                .to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.process_guid.is_some() && self.workspace_id.is_some()
    }

    /// Names of the identity keys the event did not carry
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.process_guid.is_none() {
            missing.push(FacetKey::ArtifactId.key());
        }
        if self.workspace_id.is_none() {
            missing.push(FacetKey::ArtifactWorkspaceId.key());
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_with_properties(properties: Value) -> RunEvent {
        serde_json::from_value(json!({
            "eventType": "COMPLETE",
            "run": {"runId": "r1", "facets": {"spark_properties": {"properties": properties}}},
            "job": {"name": "j1"}
        }))
        .unwrap()
    }

    #[test]
    fn test_identity_from_spark_properties() {
        let event = event_with_properties(json!({
            "trident.artifact.id": "NB-1",
            "trident.artifact.workspace.id": "WS-1",
            "spark.synapse.context.notebookname": "load_sales"
        }));
        let identity = ProcessIdentity::from_event(&event);
        assert_eq!(identity.process_guid.as_deref(), Some("NB-1"));
        assert_eq!(identity.workspace_id.as_deref(), Some("WS-1"));
        assert_eq!(identity.process_name, "load_sales");
        assert!(identity.is_complete());
    }

    #[test]
    fn test_absent_facets_give_absent_identity() {
        let event: RunEvent = serde_json::from_value(json!({"run": {"runId": "r1"}})).unwrap();
        let identity = ProcessIdentity::from_event(&event);
        assert_eq!(identity.process_guid, None);
        assert_eq!(identity.workspace_id, None);
        assert_eq!(identity.process_name, UNKNOWN_PROCESS);
        assert_eq!(
            identity.missing_keys(),
            vec!["trident.artifact.id", "trident.artifact.workspace.id"]
        );
    }

    #[test]
    fn test_blank_and_non_string_values_are_absent() {
        let event = event_with_properties(json!({
            "trident.artifact.id": "  ",
            "trident.artifact.workspace.id": 42
        }));
        let identity = ProcessIdentity::from_event(&event);
        assert!(!identity.is_complete());
        assert_eq!(identity.missing_keys().len(), 2);
    }
}
