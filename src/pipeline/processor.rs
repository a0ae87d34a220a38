//! Event Processing State Machine
//!
//! `Unprocessed -> {Processed, Failed}`. Only `Unprocessed` records are
//! eligible; anything else (including a missing record) is skipped, which is
//! what makes at-least-once redelivery safe.
//!
//! Two concurrent deliveries of the same key can both pass the guard. Both
//! then publish the same relationships, the catalog answers the loser with
//! 409, and both write `Processed`. The outcome is the same as a single
//! delivery, so no lock is taken.

use crate::catalog::{AccessToken, CachedCredential, RelationshipSink, StatusAggregate};
use crate::error::{LineageError, Result};
use crate::extract::{self, ProcessIdentity};
use crate::model::{DetailWrite, EventStatus, LineageDetailRecord, RunEvent};
use crate::store::{BlobRef, BlobStore, MetadataStore};
use chrono::Utc;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What to do when an event carries no process GUID or workspace id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingIdentityPolicy {
    /// Publish anyway with empty identity segments
    BestEffort,
    /// Mark the event `Failed` without calling the catalog
    Fail,
}

impl FromStr for MissingIdentityPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "best-effort" | "best_effort" | "besteffort" => Ok(MissingIdentityPolicy::BestEffort),
            "fail" => Ok(MissingIdentityPolicy::Fail),
            other => Err(format!("unknown missing-identity policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No tracking record exists for the blob
    NotTracked,
    /// The record already reached a terminal status
    AlreadyTerminal(EventStatus),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotTracked => f.write_str("no event metadata record"),
            SkipReason::AlreadyTerminal(status) => write!(f, "status is '{}'", status),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Skipped(SkipReason),
    Processed { relationships: usize, detail: DetailWrite },
    Failed { message: String },
}

pub struct EventProcessor {
    store: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    sink: RelationshipSink,
    team_name: String,
    missing_identity: MissingIdentityPolicy,
}

impl EventProcessor {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        sink: RelationshipSink,
        team_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            blobs,
            sink,
            team_name: team_name.into(),
            missing_identity: MissingIdentityPolicy::BestEffort,
        }
    }

    pub fn with_missing_identity(mut self, policy: MissingIdentityPolicy) -> Self {
        self.missing_identity = policy;
        self
    }

    /// Run one stored event through extract -> publish -> record.
    ///
    /// Payload and catalog problems end up as a `Failed` record. Errors reading
    /// the blob or writing the metadata tables are returned to the caller.
    pub async fn process(&self, blob: &BlobRef, credential: &AccessToken) -> Result<ProcessOutcome> {
        let team = self.team_name.as_str();
        let file_name = blob.name.as_str();

        match self.store.get_event(team, file_name)? {
            None => {
                info!(team, file_name, "Skipping event: no metadata record");
                return Ok(ProcessOutcome::Skipped(SkipReason::NotTracked));
            }
            Some(record) if record.status.is_terminal() => {
                info!(team, file_name, status = %record.status, "Skipping event: already handled");
                return Ok(ProcessOutcome::Skipped(SkipReason::AlreadyTerminal(record.status)));
            }
            Some(_) => {}
        }

        let payload = self.blobs.read(&blob.container, &blob.name)?;

        let parsed = RunEvent::from_slice(&payload)
            .map_err(LineageError::from)
            .and_then(|event| extract::extract(&event).map(|fact| (event, fact)));
        let (event, fact) = match parsed {
            Ok(parsed) => parsed,
            Err(e) if e.is_parse() => {
                warn!(team, file_name, error = %e, "Event payload could not be parsed");
                return self.fail(file_name, e.status_message());
            }
            Err(e) => return Err(e),
        };

        let identity = ProcessIdentity::from_event(&event);
        if !identity.is_complete() {
            let missing = identity.missing_keys().join(", ");
            match self.missing_identity {
                MissingIdentityPolicy::Fail => {
                    let err = LineageError::Parse(format!("missing process identity facets: {}", missing));
                    warn!(team, file_name, missing = %missing, "Refusing to publish without process identity");
                    return self.fail(file_name, err.status_message());
                }
                MissingIdentityPolicy::BestEffort => {
                    warn!(team, file_name, missing = %missing, "Publishing with incomplete process identity");
                }
            }
        }

        let mut aggregate = StatusAggregate::new();
        for relationship in fact.relationships() {
            let outcome = self.sink.publish(credential, &relationship).await;
            aggregate.observe(&outcome);
        }

        let (status, message) = aggregate.outcome();
        self.store.merge_status(team, file_name, status, &message)?;

        if status != EventStatus::Processed {
            error!(team, file_name, message = %message, "Event failed");
            return Ok(ProcessOutcome::Failed { message });
        }

        // Written only once the Processed status is stored.
        let detail = LineageDetailRecord::from_fact(team, file_name, &fact, Utc::now());
        let detail = self.store.insert_detail(&detail)?;
        info!(team, file_name, relationships = aggregate.calls(), ?detail, "Event processed");

        Ok(ProcessOutcome::Processed {
            relationships: aggregate.calls(),
            detail,
        })
    }

    /// Process every `Unprocessed` record of the team.
    ///
    /// Blobs are located through each record's `FilePath`, with `container`
    /// as the fallback. The credential is consulted before every event, so a
    /// token nearing expiry is replaced mid-pass. A failure on one event is
    /// logged and does not stop the others.
    pub async fn process_pending(
        &self,
        container: &str,
        credential: &mut CachedCredential,
    ) -> Result<Vec<(String, Result<ProcessOutcome>)>> {
        let pending = self
            .store
            .list_events(&self.team_name, Some(EventStatus::Unprocessed))?;
        info!(team = %self.team_name, count = pending.len(), "Processing pending events");

        let mut results = Vec::with_capacity(pending.len());
        for record in pending {
            // Synthesized events may live in another container; FilePath knows.
            let blob = record
                .file_path
                .strip_suffix(record.file_name.as_str())
                .and_then(|dir| dir.strip_suffix('/'))
                .filter(|dir| !dir.is_empty())
                .map(|dir| BlobRef::new(dir, record.file_name.clone()))
                .unwrap_or_else(|| BlobRef::new(container, record.file_name.clone()));
            let outcome = match credential.current().await {
                Ok(token) => self.process(&blob, &token).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &outcome {
                error!(file_name = %record.file_name, error = %e, "Event could not be processed");
            }
            results.push((record.file_name, outcome));
        }
        Ok(results)
    }

    fn fail(&self, file_name: &str, message: String) -> Result<ProcessOutcome> {
        self.store
            .merge_status(&self.team_name, file_name, EventStatus::Failed, &message)?;
        Ok(ProcessOutcome::Failed { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Best-Effort".parse::<MissingIdentityPolicy>().unwrap(), MissingIdentityPolicy::BestEffort);
        assert_eq!("fail".parse::<MissingIdentityPolicy>().unwrap(), MissingIdentityPolicy::Fail);
        assert!("maybe".parse::<MissingIdentityPolicy>().is_err());
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(
            SkipReason::AlreadyTerminal(EventStatus::Processed).to_string(),
            "status is 'Processed'"
        );
    }
}
