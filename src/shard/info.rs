//! Shard information and statistics data structures
//!
//! Provides structures describing the contents of a shard and aggregates across shards.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::shard::ShardId;

/// Information about a shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardInfo {
    /// Shard ID
    pub shard_id: ShardId,
    /// Entries currently held
    pub entry_count: usize,
    /// Id of the most recently appended entry still held, empty if none
    pub marker: String,
    /// Timestamp of the most recently appended entry still held
    pub last_update: Option<DateTime<Utc>>,
    /// Timestamp of the oldest entry still held
    pub oldest: Option<DateTime<Utc>>,
}

impl ShardInfo {
    /// Create info for an empty shard
    pub fn empty(shard_id: ShardId) -> Self {
        Self {
            shard_id,
            entry_count: 0,
            marker: String::new(),
            last_update: None,
            oldest: None,
        }
    }

    /// Check if the shard is empty
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }
}

/// Statistics about shards
#[derive(Debug, Clone, Default)]
pub struct ShardStats {
    /// Number of shards
    pub shard_count: usize,
    /// Total number of log entries
    pub total_entries: usize,
    /// Number of empty shards
    pub empty_shards: usize,
    /// Oldest entry timestamp
    pub oldest_timestamp: Option<DateTime<Utc>>,
    /// Newest entry timestamp
    pub newest_timestamp: Option<DateTime<Utc>>,
}

impl ShardStats {
    /// Create new empty shard stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one shard into the totals
    pub fn add_shard(&mut self, info: &ShardInfo) {
        self.shard_count += 1;
        self.total_entries += info.entry_count;
        if info.is_empty() {
            self.empty_shards += 1;
        }

        if let Some(oldest) = info.oldest {
            if self.oldest_timestamp.map_or(true, |current| oldest < current) {
                self.oldest_timestamp = Some(oldest);
            }
        }

        if let Some(newest) = info.last_update {
            if self.newest_timestamp.map_or(true, |current| newest > current) {
                self.newest_timestamp = Some(newest);
            }
        }
    }

    /// Calculate the average number of entries per shard
    pub fn avg_entries_per_shard(&self) -> f64 {
        if self.shard_count == 0 {
            return 0.0;
        }

        self.total_entries as f64 / self.shard_count as f64
    }

    /// Check if there are any entries
    pub fn has_entries(&self) -> bool {
        self.total_entries > 0
    }

    /// Create a human-readable report of statistics
    pub fn report(&self) -> String {
        let mut result = String::new();

        result.push_str("=== Shard Statistics ===\n\n");

        result.push_str(&format!("Total Shards: {}\n", self.shard_count));
        result.push_str(&format!("  - Empty: {}\n", self.empty_shards));
        result.push_str(&format!("Total Log Entries: {}\n", self.total_entries));
        result.push_str(&format!("Avg. Entries per Shard: {:.2}\n", self.avg_entries_per_shard()));

        if let Some(oldest) = self.oldest_timestamp {
            result.push_str(&format!("Oldest Entry: {}\n", oldest));
        }

        if let Some(newest) = self.newest_timestamp {
            result.push_str(&format!("Newest Entry: {}\n", newest));
        }

        result
    }
}
