//! Delta transaction-log entries
//!
//! A commit file is newline-delimited JSON with one action per line
//! (`commitInfo`, `add`, `remove`, `read`, ...). Some writers emit a single
//! JSON document instead, so both shapes are accepted.

use crate::error::{LineageError, Result};
use serde_json::{Map, Value};

pub const UNKNOWN_OPERATION: &str = "UNKNOWN";
pub const UNKNOWN_READ_PATH: &str = "unknown";

/// The parts of one commit the synthesizer cares about
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitEntry {
    pub commit_info: Map<String, Value>,
    /// Upstream paths recorded by `read` actions
    pub reads: Vec<String>,
}

impl CommitEntry {
    /// Commit time in epoch milliseconds
    pub fn timestamp_ms(&self) -> Option<i64> {
        let ts = self.commit_info.get("timestamp")?;
        ts.as_i64().or_else(|| ts.as_f64().map(|f| f as i64))
    }

    pub fn commit_id(&self) -> Option<String> {
        let id = self.commit_info.get("operationMetrics")?.get("commitId")?;
        match id {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn operation(&self) -> &str {
        self.commit_info
            .get("operation")
            .and_then(Value::as_str)
            .filter(|op| !op.is_empty())
            .unwrap_or(UNKNOWN_OPERATION)
    }

    fn absorb(&mut self, action: &Map<String, Value>) {
        if let Some(Value::Object(info)) = action.get("commitInfo") {
            self.commit_info = info.clone();
        }
        if let Some(reads) = action
            .get("read")
            .and_then(|read| read.get("reads"))
            .and_then(Value::as_array)
        {
            self.reads.extend(reads.iter().map(|r| {
                r.get("path")
                    .and_then(Value::as_str)
                    .unwrap_or(UNKNOWN_READ_PATH)
                    .to_string()
            }));
        }
    }
}

fn actions(bytes: &[u8]) -> Result<Vec<Value>> {
    if let Ok(document) = serde_json::from_slice::<Value>(bytes) {
        return Ok(vec![document]);
    }

    let text = std::str::from_utf8(bytes)
        .map_err(|e| LineageError::Parse(format!("commit log entry is not UTF-8: {}", e)))?;
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| LineageError::Parse(format!("commit log action {}: {}", i + 1, e)))
        })
        .collect()
}

pub fn parse_commit_entry(bytes: &[u8]) -> Result<CommitEntry> {
    let actions = actions(bytes)?;
    if actions.is_empty() {
        return Err(LineageError::Parse("commit log entry is empty".to_string()));
    }

    let mut entry = CommitEntry::default();
    for action in &actions {
        let Value::Object(action) = action else {
            return Err(LineageError::Parse("commit log action is not a JSON object".to_string()));
        };
        entry.absorb(action);
    }
    Ok(entry)
}
