//! File-backed shard log store
//!
//! One file per shard under `<dir>/shards/`. Appends go straight to the end of
//! the shard file; trims rewrite the file and swap it in with a rename, so a
//! crash mid-trim leaves either the old or the new contents. Reads are served
//! from the in-memory copy loaded at open.

use std::fs;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::LogConfig;
use crate::cursor::Cursor;
use crate::entry::LogEntry;
use crate::family::LogFamily;
use crate::shard::memory::DEFAULT_BATCH_LIMIT;
use crate::shard::{util, ListBatch, ShardId, ShardInfo, ShardLog, ShardLogStore, ShardResult, StoreError};
use crate::time::TimeRange;

/// Log store persisting each shard to its own file
#[derive(Debug)]
pub struct FileLogStore {
    base_dir: PathBuf,
    shards: Vec<RwLock<ShardLog>>,
    batch_limit: usize,
}

impl FileLogStore {
    /// Open (or create) a store with `num_shards` shards under `dir`
    pub fn open<P: AsRef<Path>>(dir: P, num_shards: u32) -> ShardResult<Self> {
        let base_dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(base_dir.join("shards"))
            .map_err(|e| StoreError::file_error(&base_dir, &e))?;

        let mut shards = Vec::with_capacity(num_shards as usize);
        let mut loaded = 0;

        for shard_id in 0..num_shards {
            let path = util::shard_path(&base_dir, shard_id);
            let log = if path.exists() {
                loaded += 1;
                let shard = util::load_shard(&path)?;
                if let Some(len) = shard.torn_at {
                    // Later appends must land right after the last whole record
                    util::truncate_shard(&path, len)?;
                    info!(shard_id, len, "truncated torn shard file");
                }
                shard.log
            } else {
                let log = ShardLog::new();
                util::save_shard(&path, &log)?;
                log
            };
            shards.push(RwLock::new(log));
        }

        info!(dir = %base_dir.display(), num_shards, loaded, "opened file log store");

        Ok(Self {
            base_dir,
            shards,
            batch_limit: DEFAULT_BATCH_LIMIT,
        })
    }

    /// Open the store for `family` under `dir` with the layout `config` describes
    pub fn open_with_config<P: AsRef<Path>>(dir: P, config: &LogConfig, family: LogFamily) -> ShardResult<Self> {
        let num_shards = config.shard_count(family).ok_or_else(|| StoreError::not_shard_indexed(family))?;
        Ok(Self::open(dir, num_shards)?.with_batch_limit(config.store_batch_limit))
    }

    /// Set the ceiling on entries returned by one read
    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit.max(1);
        self
    }

    /// Get the store's base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn shard(&self, shard_id: ShardId) -> ShardResult<&RwLock<ShardLog>> {
        self.shards
            .get(shard_id as usize)
            .ok_or_else(|| StoreError::invalid_shard(shard_id, self.num_shards()))
    }
}

impl ShardLogStore for FileLogStore {
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

        let mut trimmed = shard.clone();
        let removed = trimmed.trim(range);
        if removed > 0 {
            util::save_shard(&util::shard_path(&self.base_dir, shard_id), &trimmed)?;
            *shard = trimmed;
            debug!(shard_id, removed, "rewrote shard file after trim");
        }

        Ok(removed)
    }

    fn append(
        &self,
        shard_id: ShardId,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> ShardResult<LogEntry> {
        let mut shard = self.shard(shard_id)?.write();

        let entry = shard.next_entry(timestamp, payload);
        util::append_record(&util::shard_path(&self.base_dir, shard_id), &entry)?;
        shard.push(entry.clone());

        Ok(entry)
    }

    fn shard_info(&self, shard_id: ShardId) -> ShardResult<ShardInfo> {
        let shard = self.shard(shard_id)?.read();
        Ok(shard.info(shard_id))
    }
}
