//! Log entries
//!
//! Entries carry an opaque payload plus a stable id. The id doubles as the
//! pagination marker, so a caller can resume right after any entry it has seen.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::cursor::Cursor;

/// A single entry of a shard or bucket-index log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Stable id, unique within its shard, usable as a marker
    pub id: String,
    /// Time the change was recorded
    pub timestamp: DateTime<Utc>,
    /// Opaque payload, owned by whoever appended the entry
    pub payload: serde_json::Value,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            timestamp,
            payload,
        }
    }

    /// The cursor that resumes right after this entry
    pub fn marker(&self) -> Cursor {
        Cursor::after(self.id.clone())
    }
}
