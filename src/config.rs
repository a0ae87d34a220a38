//! Environment-driven configuration
//!
//! The binary calls `dotenv::dotenv()` first, so a local `.env` file can
//! provide any of these variables.

use crate::catalog::{ClientCredentials, DEFAULT_QUALIFIED_NAME_BASE};
use crate::error::{LineageError, Result};
use crate::pipeline::{MissingIdentityPolicy, DEFAULT_JOB_PATTERNS};
use crate::synth::{SynthNaming, DEFAULT_OUTPUT_PREFIX};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TEAM_NAME: &str = "HRSI";
const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REFRESH_SKEW_SECS: i64 = 300;

/// Storage, team and ingest settings shared by every command
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_root: PathBuf,
    pub event_container: String,
    pub team_name: String,
    pub metadata_db_path: PathBuf,
    /// Empty means every COMPLETE event is accepted
    pub job_patterns: Vec<String>,
    pub missing_identity: MissingIdentityPolicy,
    pub synth: SynthConfig,
}

#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub container: String,
    pub output_prefix: String,
    pub storage_account: String,
    pub job_namespace: String,
    pub naming: SynthNaming,
}

/// Catalog endpoint and credentials; only needed by commands that publish
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub api_url: String,
    pub qualified_name_base: String,
    pub credentials: ClientCredentials,
    pub timeout: Duration,
    pub refresh_skew: chrono::Duration,
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| LineageError::Config(format!("{} is not set", key)))
}

fn optional<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| LineageError::Config(format!("{}='{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_root = PathBuf::from(optional(&lookup, "LINEAGE_STORAGE_ROOT", "storage"));
        let event_container = optional(&lookup, "EVENT_LINEAGE_CONTAINER", "lineage-events");
        let metadata_db_path = lookup("EVENT_METADATA_DB")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| storage_root.join("metadata.db"));

        let job_patterns = match lookup("LINEAGE_JOB_PATTERNS") {
            Some(raw) if raw.trim() == "*" => Vec::new(),
            Some(raw) if !raw.trim().is_empty() => raw
                .split(',')
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            _ => DEFAULT_JOB_PATTERNS.iter().map(|p| p.to_string()).collect(),
        };

        let synth = SynthConfig {
            container: optional(&lookup, "LINEAGE_CONTAINER", &event_container),
            output_prefix: optional(&lookup, "SYNTH_OUTPUT_PREFIX", DEFAULT_OUTPUT_PREFIX),
            storage_account: optional(&lookup, "LINEAGE_STORAGE_ACCOUNT", "lineagestorage"),
            job_namespace: optional(&lookup, "SYNTH_JOB_NAMESPACE", "deltatable-lineage"),
            naming: parsed(&lookup, "SYNTH_FILE_NAMING", SynthNaming::Deterministic)?,
        };

        Ok(Self {
            storage_root,
            event_container,
            team_name: optional(&lookup, "LINEAGE_TEAM_NAME", DEFAULT_TEAM_NAME),
            metadata_db_path,
            job_patterns,
            missing_identity: parsed(&lookup, "MISSING_IDENTITY_POLICY", MissingIdentityPolicy::BestEffort)?,
            synth,
        })
    }
}

impl CatalogConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = ClientCredentials {
            authority_host: optional(&lookup, "AUTHORITY_HOST", DEFAULT_AUTHORITY_HOST),
            tenant_id: required(&lookup, "TENANT_ID")?,
            client_id: required(&lookup, "CLIENT_ID")?,
            client_secret: required(&lookup, "CLIENT_SECRET")?,
            resource: required(&lookup, "CATALOG_RESOURCE")?,
        };

        Ok(Self {
            api_url: required(&lookup, "CATALOG_API_URL")?,
            qualified_name_base: optional(&lookup, "QUALIFIED_NAME_BASE", DEFAULT_QUALIFIED_NAME_BASE),
            credentials,
            timeout: Duration::from_secs(parsed(&lookup, "HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?),
            refresh_skew: chrono::Duration::seconds(parsed(
                &lookup,
                "TOKEN_REFRESH_SKEW_SECS",
                DEFAULT_REFRESH_SKEW_SECS,
            )?),
        })
    }
}
