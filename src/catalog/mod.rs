//! Metadata catalog integration: credentials, the relationship API and the
//! idempotent sink built on top of it.

pub mod client;
pub mod credential;
pub mod sink;

pub use client::{
    qualified_name, CatalogApi, CatalogResponse, HttpCatalogClient, RelationshipRequest,
    DEFAULT_QUALIFIED_NAME_BASE,
};
pub use credential::{
    parse_token_response, AccessToken, CachedCredential, ClientCredentials, TokenProvider, TokenSource,
};
pub use sink::{PublishReceipt, RelationshipSink, StatusAggregate, StatusClass};
