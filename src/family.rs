//! Log families
//!
//! The three change logs a zone exposes to its peers. Each family has its own
//! store and its own set of supported operations.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::error::{Result, Error};

/// A family of change logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFamily {
    /// Metadata change log, partitioned into shards
    Metadata,
    /// Per-bucket index operation log, addressed by bucket rather than shard
    BucketIndex,
    /// Data change log, partitioned into shards
    Data,
}

impl fmt::Display for LogFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl LogFamily {
    /// Parse a log family from the value of the `type` parameter
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "metadata" => Ok(Self::Metadata),
            "bucket-index" => Ok(Self::BucketIndex),
            "data" => Ok(Self::Data),
            _ => Err(Error::not_found(format!("Unknown log type: {}", s))),
        }
    }

    /// Get the wire name of the log family
    pub fn name(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::BucketIndex => "bucket-index",
            Self::Data => "data",
        }
    }

    /// Whether entries are addressed by shard index
    pub fn is_shard_indexed(&self) -> bool {
        !matches!(self, Self::BucketIndex)
    }

    /// Whether the family supports shard leases
    pub fn supports_leases(&self) -> bool {
        self.is_shard_indexed()
    }

    /// Get all log families
    pub fn all() -> [Self; 3] {
        [Self::Metadata, Self::BucketIndex, Self::Data]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_parsing() {
        assert_eq!(LogFamily::from_str("metadata").unwrap(), LogFamily::Metadata);
        assert_eq!(LogFamily::from_str("bucket-index").unwrap(), LogFamily::BucketIndex);
        assert_eq!(LogFamily::from_str("data").unwrap(), LogFamily::Data);
        assert!(LogFamily::from_str("Metadata").unwrap_err().is_not_found());
        assert!(LogFamily::from_str("").is_err());

        for family in LogFamily::all() {
            assert_eq!(LogFamily::from_str(&family.to_string()).unwrap(), family);
        }
    }

    #[test]
    fn test_family_capabilities() {
        assert!(LogFamily::Metadata.supports_leases());
        assert!(LogFamily::Data.is_shard_indexed());
        assert!(!LogFamily::BucketIndex.is_shard_indexed());
        assert!(!LogFamily::BucketIndex.supports_leases());
    }
}
