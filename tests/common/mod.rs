#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use lineage_bridge::catalog::{
    AccessToken, CachedCredential, CatalogApi, CatalogResponse, RelationshipRequest, RelationshipSink, TokenSource,
};
use lineage_bridge::error::{LineageError, Result};
use lineage_bridge::model::EventMetadataRecord;
use lineage_bridge::pipeline::{EventProcessor, MissingIdentityPolicy};
use lineage_bridge::store::{BlobStore, MemoryBlobStore, MetadataStore, SqliteMetadataStore};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const TEAM: &str = "HRSI";
pub const CONTAINER: &str = "lineage-events";
pub const BASE: &str = "https://catalog.test";

/// Scripted reply of the fake catalog
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, &'static str),
    Transport,
}

/// Catalog that records every request and answers from a script (201 once
/// the script runs out).
#[derive(Default)]
pub struct FakeCatalog {
    requests: Mutex<Vec<RelationshipRequest>>,
    tokens: Mutex<Vec<String>>,
    script: Mutex<VecDeque<Reply>>,
}

impl FakeCatalog {
    pub fn scripted(replies: Vec<Reply>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
            script: Mutex::new(replies.into()),
        }
    }

    pub fn requests(&self) -> Vec<RelationshipRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Bearer token secret of every request, in call order
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn create_relationship(
        &self,
        credential: &AccessToken,
        request: &RelationshipRequest,
    ) -> Result<CatalogResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.tokens.lock().unwrap().push(credential.secret().to_string());
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Status(201, "created"));
        match reply {
            Reply::Status(status, body) => Ok(CatalogResponse {
                status,
                body: body.to_string(),
            }),
            Reply::Transport => Err(LineageError::Catalog("connection reset".to_string())),
        }
    }
}

pub struct Harness {
    pub blobs: Arc<MemoryBlobStore>,
    pub store: Arc<SqliteMetadataStore>,
    pub catalog: Arc<FakeCatalog>,
    pub processor: EventProcessor,
}

impl Harness {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self::with_policy(replies, MissingIdentityPolicy::BestEffort)
    }

    pub fn with_policy(replies: Vec<Reply>, policy: MissingIdentityPolicy) -> Self {
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = Arc::new(SqliteMetadataStore::in_memory().unwrap());
        store.ensure_tables().unwrap();
        let catalog = Arc::new(FakeCatalog::scripted(replies));
        let sink = RelationshipSink::new(catalog.clone(), BASE);
        let processor = EventProcessor::new(store.clone(), blobs.clone(), sink, TEAM).with_missing_identity(policy);
        Self {
            blobs,
            store,
            catalog,
            processor,
        }
    }

    /// Store a payload and open an `Unprocessed` record for it
    pub fn seed(&self, file_name: &str, event: &Value) {
        self.blobs
            .write(CONTAINER, file_name, &serde_json::to_vec(event).unwrap())
            .unwrap();
        self.store
            .insert_event(&EventMetadataRecord::unprocessed(
                TEAM,
                file_name,
                &format!("{}/{}", CONTAINER, file_name),
            ))
            .unwrap();
    }

    pub fn record(&self, file_name: &str) -> EventMetadataRecord {
        self.store.get_event(TEAM, file_name).unwrap().unwrap()
    }
}

pub fn token() -> AccessToken {
    AccessToken::new("test-token", Utc::now() + Duration::hours(1))
}

/// Issues `token-1`, `token-2`, ... each valid for `lifetime`
pub struct CountingTokenSource {
    pub issued: Arc<AtomicUsize>,
    pub lifetime: Duration,
}

#[async_trait]
impl TokenSource for CountingTokenSource {
    async fn acquire(&self) -> Result<AccessToken> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessToken::new(format!("token-{}", n), Utc::now() + self.lifetime))
    }
}

/// Cached credential with a five minute refresh skew, plus its issue counter
pub fn credential(lifetime: Duration) -> (CachedCredential, Arc<AtomicUsize>) {
    let issued = Arc::new(AtomicUsize::new(0));
    let source = CountingTokenSource {
        issued: issued.clone(),
        lifetime,
    };
    (CachedCredential::new(source, Duration::seconds(300)), issued)
}

/// The two-dataset event used throughout the pipeline tests
pub fn basic_event() -> Value {
    json!({
        "eventType": "COMPLETE",
        "run": {"runId": "r1"},
        "job": {"name": "j1"},
        "inputs": [{"name": "ns/G1/path"}],
        "outputs": [{
            "name": "ns/G2/path",
            "facets": {"schema": {"fields": [{"name": "col_a"}]}}
        }]
    })
}

pub fn with_identity(mut event: Value, process: &str, workspace: &str) -> Value {
    event["run"]["facets"] = json!({
        "spark_properties": {
            "properties": {
                "trident.artifact.id": process,
                "trident.artifact.workspace.id": workspace,
                "spark.synapse.context.notebookname": "nb_orders"
            }
        }
    });
    event
}
