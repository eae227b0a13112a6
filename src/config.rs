//! Configuration for shardlog
//!
//! This module provides configuration options for log access: shard counts for
//! the shard-indexed families, list limits and metrics collection.

#[cfg(feature = "toml")]
use std::path::Path;
use serde::{Serialize, Deserialize};

use crate::error::{Result, Error};
use crate::family::LogFamily;

/// Configuration options for log access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct LogConfig {
    // Shard layout
    /// Number of shards in the metadata log
    pub metadata_log_shards: u32,
    /// Number of shards in the data log
    pub data_log_shards: u32,

    // List settings
    /// Entries returned by a list call that does not name `max-entries`
    pub default_max_entries: usize,
    /// Ceiling on entries returned by one read from a reference store
    pub store_batch_limit: usize,

    // Additional settings
    /// Enable metrics collection
    pub collect_metrics: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            metadata_log_shards: 64,
            data_log_shards: 128,

            default_max_entries: 1000,
            store_batch_limit: 1000,

            collect_metrics: true,
        }
    }
}

impl LogConfig {
    /// Create a new log configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of metadata log shards
    pub fn with_metadata_log_shards(mut self, shards: u32) -> Self {
        self.metadata_log_shards = shards;
        self
    }

    /// Set the number of data log shards
    pub fn with_data_log_shards(mut self, shards: u32) -> Self {
        self.data_log_shards = shards;
        self
    }

    /// Set the default number of entries per list call
    pub fn with_default_max_entries(mut self, max_entries: usize) -> Self {
        self.default_max_entries = max_entries;
        self
    }

    /// Set the per-read ceiling used by the reference stores
    pub fn with_store_batch_limit(mut self, limit: usize) -> Self {
        self.store_batch_limit = limit;
        self
    }

    /// Set whether to collect metrics
    pub fn with_collect_metrics(mut self, collect: bool) -> Self {
        self.collect_metrics = collect;
        self
    }

    /// Number of shards configured for a family.
    ///
    /// Returns `None` for the bucket-index family, which is not shard-indexed.
    pub fn shard_count(&self, family: LogFamily) -> Option<u32> {
        match family {
            LogFamily::Metadata => Some(self.metadata_log_shards),
            LogFamily::Data => Some(self.data_log_shards),
            LogFamily::BucketIndex => None,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.metadata_log_shards < 1 {
            return Err(Error::config(
                "Metadata log must have at least 1 shard"
            ));
        }

        if self.data_log_shards < 1 {
            return Err(Error::config(
                "Data log must have at least 1 shard"
            ));
        }

        if self.default_max_entries < 1 {
            return Err(Error::config(
                "Default max entries must be at least 1"
            ));
        }

        if self.store_batch_limit < 1 {
            return Err(Error::config(
                "Store batch limit must be at least 1"
            ));
        }

        Ok(())
    }

    /// Create a human-readable string representation of the configuration
    pub fn to_string_pretty(&self) -> String {
        let mut result = String::new();

        result.push_str("=== Shard Log Configuration ===\n\n");

        result.push_str("Shard Layout:\n");
        result.push_str(&format!("  Metadata Log Shards: {}\n", self.metadata_log_shards));
        result.push_str(&format!("  Data Log Shards: {}\n", self.data_log_shards));

        result.push_str("\nList Settings:\n");
        result.push_str(&format!("  Default Max Entries: {}\n", self.default_max_entries));
        result.push_str(&format!("  Store Batch Limit: {}\n", self.store_batch_limit));

        result.push_str("\nAdditional Settings:\n");
        result.push_str(&format!("  Collect Metrics: {}\n", self.collect_metrics));

        result
    }

    /// Load configuration from a TOML file
    #[cfg(feature = "toml")]
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        use std::fs::read_to_string;
        use toml::from_str;

        let content = read_to_string(path)?;
        let config: Self = from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    #[cfg(feature = "toml")]
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::fs::write;
        use toml::to_string_pretty;

        let content = to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize to TOML: {}", e)))?;

        write(path, content)?;

        Ok(())
    }
}
