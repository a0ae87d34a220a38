//! Catalog relationship API: wire payload and HTTP client

use crate::catalog::credential::AccessToken;
use crate::error::{LineageError, Result};
use crate::model::{CatalogRelationship, Direction, Endpoint, EndpointKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_QUALIFIED_NAME_BASE: &str = "https://app.fabric.microsoft.com";
const RELATIONSHIP_PATH: &str = "/datamap/api/atlas/v2/relationship";

/// Raw response from the relationship endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogResponse {
    pub status: u16,
    pub body: String,
}

/// The single catalog operation the bridge needs
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn create_relationship(
        &self,
        credential: &AccessToken,
        request: &RelationshipRequest,
    ) -> Result<CatalogResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueAttributes {
    pub qualified_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipEnd {
    pub type_name: String,
    pub unique_attributes: UniqueAttributes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipRequest {
    pub guid: String,
    pub type_name: String,
    pub end1: RelationshipEnd,
    pub end2: RelationshipEnd,
}

/// `{base}/groups/{workspace}/{segment}/{guid}`
pub fn qualified_name(base: &str, workspace_id: &str, kind: EndpointKind, guid: &str) -> String {
    format!(
        "{}/groups/{}/{}/{}",
        base.trim_end_matches('/'),
        workspace_id,
        kind.path_segment(),
        guid
    )
}

pub fn relationship_type_name(direction: Direction) -> &'static str {
    match direction {
        Direction::Input => "dataset_process_inputs",
        Direction::Output => "process_dataset_outputs",
    }
}

impl RelationshipRequest {
    /// end1 is the source endpoint, end2 the target. Absent ids render as empty segments.
    pub fn build(relationship: &CatalogRelationship, qualified_name_base: &str) -> Self {
        let workspace = relationship.workspace_id.as_deref().unwrap_or_default();
        let end = |endpoint: &Endpoint| RelationshipEnd {
            type_name: endpoint.kind.type_name().to_string(),
            unique_attributes: UniqueAttributes {
                qualified_name: qualified_name(
                    qualified_name_base,
                    workspace,
                    endpoint.kind,
                    endpoint.guid.as_deref().unwrap_or_default(),
                ),
            },
        };

        Self {
            guid: "-1".to_string(),
            type_name: relationship_type_name(relationship.direction).to_string(),
            end1: end(&relationship.source),
            end2: end(&relationship.target),
        }
    }
}

/// reqwest-backed catalog client
pub struct HttpCatalogClient {
    http: reqwest::Client,
    api_url: String,
}

impl HttpCatalogClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
        })
    }

    pub fn relationship_url(&self) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), RELATIONSHIP_PATH)
    }
}

#[async_trait]
impl CatalogApi for HttpCatalogClient {
    async fn create_relationship(
        &self,
        credential: &AccessToken,
        request: &RelationshipRequest,
    ) -> Result<CatalogResponse> {
        debug!(type_name = %request.type_name, "Posting catalog relationship");

        let response = self
            .http
            .post(self.relationship_url())
            .bearer_auth(credential.secret())
            .json(request)
            .send()
            .await
            .map_err(|e| LineageError::Catalog(format!("relationship request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| LineageError::Catalog(format!("unreadable relationship response: {}", e)))?;

        Ok(CatalogResponse { status, body })
    }
}
