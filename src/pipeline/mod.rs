//! Event pipeline: the ingest stage that opens tracking records and the state
//! machine that turns tracked events into catalog relationships.

pub mod processor;
pub mod receiver;

pub use processor::{EventProcessor, MissingIdentityPolicy, ProcessOutcome, SkipReason};
pub use receiver::{event_file_name, EventReceiver, ReceiveOutcome, DEFAULT_JOB_PATTERNS};
