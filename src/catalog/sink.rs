//! Catalog Relationship Sink
//!
//! Publishes one relationship per call and classifies the catalog's answer.
//! A 409 is success: it is what makes redelivered events harmless.

use crate::catalog::client::{CatalogApi, RelationshipRequest};
use crate::catalog::credential::AccessToken;
use crate::error::{LineageError, Result};
use crate::model::{CatalogRelationship, Direction, EventStatus, SUCCESS_MESSAGE};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Created,
    AlreadyExists,
    Failed,
}

impl StatusClass {
    pub fn classify(status: u16) -> Self {
        match status {
            200 | 201 => StatusClass::Created,
            409 => StatusClass::AlreadyExists,
            _ => StatusClass::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, StatusClass::Failed)
    }
}

/// Successful publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub direction: Direction,
    pub status: u16,
    pub class: StatusClass,
    pub message: String,
}

pub struct RelationshipSink {
    catalog: Arc<dyn CatalogApi>,
    qualified_name_base: String,
}

impl RelationshipSink {
    pub fn new(catalog: Arc<dyn CatalogApi>, qualified_name_base: impl Into<String>) -> Self {
        Self {
            catalog,
            qualified_name_base: qualified_name_base.into(),
        }
    }

    /// Send one relationship. Rejections come back as `LineageError::Sink`
    /// carrying the catalog's status and body verbatim.
    pub async fn publish(
        &self,
        credential: &AccessToken,
        relationship: &CatalogRelationship,
    ) -> Result<PublishReceipt> {
        let request = RelationshipRequest::build(relationship, &self.qualified_name_base);
        let direction = relationship.direction;

        info!(%direction, "Sending lineage relationship to catalog");
        let response = self.catalog.create_relationship(credential, &request).await?;

        let class = StatusClass::classify(response.status);
        if !class.is_success() {
            error!(%direction, status = response.status, body = %response.body, "Lineage relationship rejected");
            return Err(LineageError::Sink {
                status: response.status,
                message: response.body,
            });
        }
        if class == StatusClass::AlreadyExists {
            info!(%direction, "Lineage relationship already exists, nothing to do");
        } else {
            info!(%direction, status = response.status, "Lineage relationship created");
        }

        Ok(PublishReceipt {
            direction,
            status: response.status,
            class,
            message: response.body,
        })
    }
}

/// Worst outcome across the relationship calls of one event.
///
/// Any failure outranks every success; within a class the higher status code
/// wins, and the first observation wins a tie.
#[derive(Debug, Default)]
pub struct StatusAggregate {
    calls: usize,
    worst: Option<Observation>,
}

#[derive(Debug, Clone)]
struct Observation {
    failed: bool,
    status: u16,
    message: String,
}

impl Observation {
    fn rank(&self) -> (bool, u16) {
        (self.failed, self.status)
    }
}

impl StatusAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, outcome: &Result<PublishReceipt>) {
        let observation = match outcome {
            Ok(receipt) => Observation {
                failed: false,
                status: receipt.status,
                message: receipt.message.clone(),
            },
            Err(err) => Observation {
                failed: true,
                status: err.status_code().unwrap_or(0),
                message: err.status_message(),
            },
        };

        self.calls += 1;
        let replace = match &self.worst {
            Some(current) => observation.rank() > current.rank(),
            None => true,
        };
        if replace {
            self.worst = Some(observation);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn worst_status(&self) -> Option<u16> {
        self.worst.as_ref().map(|w| w.status)
    }

    /// Final event status and the message to persist with it
    pub fn outcome(&self) -> (EventStatus, String) {
        match &self.worst {
            Some(worst) if worst.failed => (EventStatus::Failed, worst.message.clone()),
            _ => (EventStatus::Processed, SUCCESS_MESSAGE.to_string()),
        }
    }
}
