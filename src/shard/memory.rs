//! In-memory shard log store

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::config::LogConfig;
use crate::cursor::Cursor;
use crate::entry::LogEntry;
use crate::family::LogFamily;
use crate::shard::{ListBatch, ShardId, ShardInfo, ShardLog, ShardLogStore, ShardResult, StoreError};
use crate::time::TimeRange;

/// Default ceiling on entries returned by one store read
pub const DEFAULT_BATCH_LIMIT: usize = 1000;

/// Log store keeping every shard in memory
#[derive(Debug)]
pub struct MemoryLogStore {
    shards: Vec<RwLock<ShardLog>>,
    batch_limit: usize,
}

impl MemoryLogStore {
    /// Create a store with `num_shards` empty shards
    pub fn new(num_shards: u32) -> Self {
        Self::with_batch_limit(num_shards, DEFAULT_BATCH_LIMIT)
    }

    /// Create a store whose reads return at most `batch_limit` entries each
    pub fn with_batch_limit(num_shards: u32, batch_limit: usize) -> Self {
        Self {
            shards: (0..num_shards).map(|_| RwLock::new(ShardLog::new())).collect(),
            batch_limit: batch_limit.max(1),
        }
    }

    /// Create a store laid out for `family` as `config` describes
    pub fn from_config(config: &LogConfig, family: LogFamily) -> ShardResult<Self> {
        let num_shards = config.shard_count(family).ok_or_else(|| StoreError::not_shard_indexed(family))?;
        Ok(Self::with_batch_limit(num_shards, config.store_batch_limit))
    }

    /// Ceiling on entries returned by one read
    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    fn shard(&self, shard_id: ShardId) -> ShardResult<&RwLock<ShardLog>> {
        self.shards
            .get(shard_id as usize)
            .ok_or_else(|| StoreError::invalid_shard(shard_id, self.num_shards()))
    }
}

impl ShardLogStore for MemoryLogStore {
    fn num_shards(&self) -> u32 {
        self.shards.len() as u32
    }

    fn list(
        &self,
        shard_id: ShardId,
        range: &TimeRange,
        cursor: &Cursor,
        max_entries: usize,
    ) -> ShardResult<ListBatch> {
        let shard = self.shard(shard_id)?.read();
        Ok(shard.select(range, cursor, max_entries, self.batch_limit))
    }

    fn trim(&self, shard_id: ShardId, range: &TimeRange) -> ShardResult<usize> {
        let mut shard = self.shard(shard_id)?.write();
        Ok(shard.trim(range))
    }

    fn append(
        &self,
        shard_id: ShardId,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> ShardResult<LogEntry> {
        let mut shard = self.shard(shard_id)?.write();
        Ok(shard.append(timestamp, payload))
    }

    fn shard_info(&self, shard_id: ShardId) -> ShardResult<ShardInfo> {
        let shard = self.shard(shard_id)?.read();
        Ok(shard.info(shard_id))
    }
}
