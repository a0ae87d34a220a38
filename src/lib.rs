//! Lineage bridge: OpenLineage RunEvents in, catalog relationships out.
//!
//! Inbound events are stored and tracked (`pipeline::receiver`), reduced to a
//! lineage fact (`extract`), published as one relationship per dataset edge
//! (`catalog`) and settled in the tracking tables (`pipeline::processor`).
//! Jobs that never emit events are covered by synthesizing them from Delta
//! commit logs (`synth`).

pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod synth;

pub use error::{LineageError, Result};
