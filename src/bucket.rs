//! Bucket index logs
//!
//! The bucket-index family is not shard-indexed. Each bucket has its own log,
//! addressed by bucket name, which is first resolved to the bucket's identity.
//! Trims are expressed as an inclusive range of entry markers rather than a
//! time range.

use std::collections::HashMap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::config::LogConfig;
use crate::cursor::Cursor;
use crate::entry::LogEntry;
use crate::shard::{ListBatch, ShardLog, ShardResult, StoreError};
use crate::time::TimeRange;

/// Resolved identity of a bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketId {
    /// Bucket name as supplied by callers
    pub name: String,
    /// Stable bucket instance id
    pub bucket_id: String,
}

/// Storage engine for per-bucket index logs
pub trait BucketIndexLog: Send + Sync {
    /// Look up a bucket by name
    fn resolve_bucket(&self, name: &str) -> ShardResult<BucketId>;

    /// Read up to `max_entries` entries after `marker`
    fn list(&self, bucket: &BucketId, marker: &Cursor, max_entries: usize) -> ShardResult<ListBatch>;

    /// Remove entries with ids in `[start_marker, end_marker]`, returning how many were removed
    fn trim(&self, bucket: &BucketId, start_marker: &str, end_marker: &str) -> ShardResult<usize>;
}

struct BucketLog {
    id: BucketId,
    log: ShardLog,
}

/// Bucket index logs kept in memory
pub struct MemoryBucketIndex {
    buckets: RwLock<HashMap<String, BucketLog>>,
    batch_limit: usize,
}

impl Default for MemoryBucketIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBucketIndex {
    /// Create an empty index with no buckets
    pub fn new() -> Self {
        Self::with_batch_limit(crate::shard::DEFAULT_BATCH_LIMIT)
    }

    /// Create an index whose reads return at most `batch_limit` entries each
    pub fn with_batch_limit(batch_limit: usize) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            batch_limit: batch_limit.max(1),
        }
    }

    /// Create an empty index using the configured per-read ceiling
    pub fn from_config(config: &LogConfig) -> Self {
        Self::with_batch_limit(config.store_batch_limit)
    }

    /// Create a bucket, returning its identity. Creating an existing bucket returns the existing identity.
    pub fn create_bucket(&self, name: &str) -> BucketId {
        let mut buckets = self.buckets.write();
        buckets
            .entry(name.to_string())
            .or_insert_with(|| BucketLog {
                id: BucketId {
                    name: name.to_string(),
                    bucket_id: Uuid::new_v4().to_string(),
                },
                log: ShardLog::new(),
            })
            .id
            .clone()
    }

    /// Append an index operation to a bucket's log
    pub fn append(
        &self,
        bucket_name: &str,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> ShardResult<LogEntry> {
        let mut buckets = self.buckets.write();
        let bucket = buckets
            .get_mut(bucket_name)
            .ok_or_else(|| StoreError::not_found(format!("No such bucket: {}", bucket_name)))?;
        Ok(bucket.log.append(timestamp, payload))
    }

    /// Number of entries currently held for a bucket
    pub fn entry_count(&self, bucket_name: &str) -> usize {
        self.buckets
            .read()
            .get(bucket_name)
            .map_or(0, |bucket| bucket.log.entries().len())
    }
}

impl BucketIndexLog for MemoryBucketIndex {
    fn resolve_bucket(&self, name: &str) -> ShardResult<BucketId> {
        self.buckets
            .read()
            .get(name)
            .map(|bucket| bucket.id.clone())
            .ok_or_else(|| StoreError::not_found(format!("No such bucket: {}", name)))
    }

    fn list(&self, bucket: &BucketId, marker: &Cursor, max_entries: usize) -> ShardResult<ListBatch> {
        let buckets = self.buckets.read();
        let log = buckets
            .get(&bucket.name)
            .filter(|b| b.id == *bucket)
            .ok_or_else(|| StoreError::not_found(format!("No such bucket: {}", bucket.name)))?;
        Ok(log.log.select(&TimeRange::unbounded(), marker, max_entries, self.batch_limit))
    }

    fn trim(&self, bucket: &BucketId, start_marker: &str, end_marker: &str) -> ShardResult<usize> {
        let mut buckets = self.buckets.write();
        let log = buckets
            .get_mut(&bucket.name)
            .filter(|b| b.id == *bucket)
            .ok_or_else(|| StoreError::not_found(format!("No such bucket: {}", bucket.name)))?;
        Ok(log.log.trim_markers(start_marker, end_marker))
    }
}
