//! Paginated listing
//!
//! A single list call may need several reads from the store: each read is
//! bounded by the store's own batch size, while the caller's `max_entries`
//! bounds the whole call. Shard-indexed lists collect every batch before
//! returning, so a failing read yields the error alone. Bucket-index lists hand
//! each batch to the sink as soon as it is read.

use std::sync::Arc;
use std::time::Instant;
use serde::{Serialize, Deserialize};
use tracing::{debug, trace, warn};

use crate::bucket::{BucketId, BucketIndexLog};
use crate::cursor::Cursor;
use crate::entry::LogEntry;
use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::response::EntrySink;
use crate::shard::{ShardId, ShardLogStore};
use crate::time::TimeRange;

/// Result of one paginated list call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListPage {
    /// Entries in append order
    pub entries: Vec<LogEntry>,
    /// Cursor to pass to the next call
    pub next_cursor: Cursor,
    /// More matching entries exist beyond this page
    pub truncated: bool,
}

/// Summary of a streamed list call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamSummary {
    /// Entries handed to the sink
    pub count: usize,
    /// Id of the last entry emitted, or the starting marker if none were
    pub marker: Cursor,
    /// More entries exist beyond the last one emitted
    pub truncated: bool,
}

/// Drives repeated bounded reads until the caller's cap or the end of the log
#[derive(Debug, Clone)]
pub struct PaginatedLister {
    metrics: Arc<MetricsCollector>,
}

impl PaginatedLister {
    /// Create a new lister reporting into `metrics`
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self { metrics }
    }

    /// List up to `max_entries` entries of one shard, starting after `cursor`.
    ///
    /// Nothing is returned unless every read succeeds.
    pub fn list(
        &self,
        store: &dyn ShardLogStore,
        shard_id: ShardId,
        range: &TimeRange,
        cursor: Cursor,
        max_entries: usize,
    ) -> Result<ListPage> {
        let start = Instant::now();
        self.metrics.increment_lists();

        let mut page = ListPage {
            entries: Vec::new(),
            next_cursor: cursor,
            truncated: false,
        };

        while page.entries.len() < max_entries {
            let remaining = max_entries - page.entries.len();
            self.metrics.increment_list_batches();

            let batch = store
                .list(shard_id, range, &page.next_cursor, remaining)
                .map_err(|e| {
                    self.metrics.record_store_failure();
                    warn!(shard_id, code = e.code(), error = %e, "shard list failed");
                    e
                })?;
            trace!(shard_id, read = batch.entries.len(), truncated = batch.truncated, "read batch");

            let mut entries = batch.entries;
            let stalled = entries.is_empty() && batch.next_cursor == page.next_cursor;

            // A store that over-returns is clipped to the budget
            if entries.len() > remaining {
                entries.truncate(remaining);
                page.truncated = true;
                page.next_cursor = entries.last().map_or(page.next_cursor, LogEntry::marker);
            } else {
                page.truncated = batch.truncated;
                page.next_cursor = batch.next_cursor;
            }
            page.entries.extend(entries);

            if !page.truncated || stalled {
                break;
            }
        }

        self.metrics.add_entries_listed(page.entries.len());
        self.metrics.record_list_duration(start.elapsed());
        debug!(
            shard_id,
            %range,
            count = page.entries.len(),
            truncated = page.truncated,
            "listed shard"
        );

        Ok(page)
    }

    /// List up to `max_entries` entries of a bucket's index log, emitting each
    /// batch to `sink` as it is read.
    ///
    /// Entries emitted before a failing read stay emitted.
    pub fn list_streaming(
        &self,
        log: &dyn BucketIndexLog,
        bucket: &BucketId,
        marker: Cursor,
        max_entries: usize,
        sink: &mut dyn EntrySink,
    ) -> Result<StreamSummary> {
        let start = Instant::now();
        self.metrics.increment_lists();

        let mut summary = StreamSummary {
            count: 0,
            marker,
            truncated: false,
        };

        while summary.count < max_entries {
            let remaining = max_entries - summary.count;
            self.metrics.increment_list_batches();

            let batch = log.list(bucket, &summary.marker, remaining).map_err(|e| {
                self.metrics.record_store_failure();
                warn!(bucket = %bucket.name, emitted = summary.count, code = e.code(), error = %e, "bucket index list failed");
                e
            })?;

            let clipped = batch.entries.len() > remaining;
            let mut emitted = 0;
            for entry in batch.entries.iter().take(remaining) {
                sink.emit(entry)?;
                summary.marker = entry.marker();
                emitted += 1;
            }
            summary.count += emitted;
            self.metrics.add_entries_listed(emitted);

            summary.truncated = batch.truncated || clipped;
            if !summary.truncated || emitted == 0 {
                break;
            }
        }

        self.metrics.record_list_duration(start.elapsed());
        debug!(bucket = %bucket.name, count = summary.count, truncated = summary.truncated, "listed bucket index");

        Ok(summary)
    }
}
