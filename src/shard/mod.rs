//! Shard-partitioned log storage
//!
//! Each shard-indexed log family is backed by a [`ShardLogStore`]. A store
//! holds a fixed number of shards, each an independently ordered sequence of
//! entries, and answers bounded range reads against them. Two implementations
//! are provided: an in-memory store and a file-backed store with one file per
//! shard.

mod error;
mod info;
mod log;
mod util;
mod memory;
mod file;

use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

pub use error::{StoreError, ShardResult};
pub use info::{ShardInfo, ShardStats};
pub use memory::{MemoryLogStore, DEFAULT_BATCH_LIMIT};
pub use file::FileLogStore;
pub(crate) use log::ShardLog;

use crate::cursor::Cursor;
use crate::entry::LogEntry;
use crate::family::LogFamily;
use crate::time::TimeRange;

/// Shard ID type
pub type ShardId = u32;

/// Magic bytes and version for shard files
pub(crate) const SHARD_MAGIC: &[u8; 4] = b"SLGS";
pub(crate) const SHARD_VERSION: u32 = 1;

/// A shard within a particular log family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardKey {
    /// Log family
    pub family: LogFamily,
    /// Shard index within the family
    pub shard_id: ShardId,
}

impl ShardKey {
    /// Create a new shard key
    pub fn new(family: LogFamily, shard_id: ShardId) -> Self {
        Self { family, shard_id }
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.family, self.shard_id)
    }
}

/// One bounded read from a log store
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListBatch {
    /// Entries in append order
    pub entries: Vec<LogEntry>,
    /// Where the next read should resume
    pub next_cursor: Cursor,
    /// More matching entries exist beyond this batch
    pub truncated: bool,
}

/// Storage engine for one shard-indexed log family
pub trait ShardLogStore: Send + Sync {
    /// Number of shards held by the store
    fn num_shards(&self) -> u32;

    /// Read up to `max_entries` entries after `cursor` whose timestamps fall in `range`.
    ///
    /// A store may return fewer entries than requested and report `truncated`.
    fn list(
        &self,
        shard_id: ShardId,
        range: &TimeRange,
        cursor: &Cursor,
        max_entries: usize,
    ) -> ShardResult<ListBatch>;

    /// Remove every entry whose timestamp falls in `range`, returning how many were removed
    fn trim(&self, shard_id: ShardId, range: &TimeRange) -> ShardResult<usize>;

    /// Append an entry to a shard
    fn append(
        &self,
        shard_id: ShardId,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> ShardResult<LogEntry>;

    /// Summary of one shard
    fn shard_info(&self, shard_id: ShardId) -> ShardResult<ShardInfo>;

    /// Statistics across all shards
    fn stats(&self) -> ShardResult<ShardStats> {
        let mut stats = ShardStats::new();
        for shard_id in 0..self.num_shards() {
            stats.add_shard(&self.shard_info(shard_id)?);
        }
        Ok(stats)
    }
}
