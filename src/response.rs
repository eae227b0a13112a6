//! Response rendering
//!
//! Handlers push list entries into an [`EntrySink`] as they become visible to
//! the caller. [`JsonResponse`] collects them and renders the final body once
//! the handler's outcome is known.

use serde::{Serialize, Deserialize};
use serde_json::{json, Value};

use crate::dispatch::Outcome;
use crate::entry::LogEntry;
use crate::error::{http_status_for, Result};

/// Receiver for entries emitted by a list operation
pub trait EntrySink {
    /// Accept one entry
    fn emit(&mut self, entry: &LogEntry) -> Result<()>;
}

impl EntrySink for Vec<LogEntry> {
    fn emit(&mut self, entry: &LogEntry) -> Result<()> {
        self.push(entry.clone());
        Ok(())
    }
}

/// A finished response: status plus JSON body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedResponse {
    /// 0 on success, negative errno-style status otherwise
    pub status: i32,
    /// HTTP status code
    pub http_status: u16,
    /// Response body, empty when there is nothing to report
    pub body: String,
}

impl RenderedResponse {
    /// Check if the response reports success
    pub fn is_success(&self) -> bool {
        self.status >= 0
    }

    /// Parse the body as JSON, `None` for an empty body
    pub fn json(&self) -> Option<Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }
}

/// JSON response builder
#[derive(Debug, Default)]
pub struct JsonResponse {
    entries: Vec<Value>,
}

impl JsonResponse {
    /// Create an empty response
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries emitted so far
    pub fn emitted(&self) -> usize {
        self.entries.len()
    }

    /// Render the response for a handler result.
    ///
    /// A failed list still renders whatever entries were emitted before the
    /// failure, alongside the error status.
    pub fn finish(self, result: &Result<Outcome>) -> RenderedResponse {
        let (status, body) = match result {
            Ok(Outcome::Listed { .. }) => (0, Some(json!({ "entries": self.entries }))),
            Ok(Outcome::ShardCount(num_objects)) => (0, Some(json!({ "num_objects": num_objects }))),
            Ok(Outcome::Info(info)) => (
                0,
                Some(json!({
                    "marker": info.marker,
                    "last_update": info.last_update,
                })),
            ),
            Ok(Outcome::Done) => (0, None),
            Err(err) if self.entries.is_empty() => (err.status(), None),
            Err(err) => (err.status(), Some(json!({ "entries": self.entries }))),
        };

        RenderedResponse {
            status,
            http_status: http_status_for(status),
            body: body.map(|v| v.to_string()).unwrap_or_default(),
        }
    }
}

impl EntrySink for JsonResponse {
    fn emit(&mut self, entry: &LogEntry) -> Result<()> {
        self.entries.push(serde_json::to_value(entry)?);
        Ok(())
    }
}
