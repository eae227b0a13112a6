//! Error types for the shard module
//!
//! Log stores report failures as an errno-style code plus a message. The code
//! is carried through to the caller unchanged.

use std::io;
use std::path::Path;
use thiserror::Error;

use crate::error::errno;
use crate::family::LogFamily;

/// Failure reported by a log store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (status {code})")]
pub struct StoreError {
    code: i32,
    message: String,
}

/// Result type for shard operations
pub type ShardResult<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Create a store error with an explicit status code.
    ///
    /// Positive codes are normalized to their negative form.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: code.checked_abs().map_or(i32::MIN, |c| -c),
            message: message.into(),
        }
    }

    /// Create an error for a shard index the store does not have
    pub fn invalid_shard(shard_id: u32, num_shards: u32) -> Self {
        Self::new(
            errno::EINVAL,
            format!("Shard {} out of range (store has {} shards)", shard_id, num_shards),
        )
    }

    /// Create an error for a family that has no shard layout
    pub fn not_shard_indexed(family: LogFamily) -> Self {
        Self::new(errno::EINVAL, format!("{} log is not shard-indexed", family))
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(errno::ENOENT, message)
    }

    /// Create a corruption error for a store file
    pub fn corruption(path: &Path, message: impl Into<String>) -> Self {
        Self::new(errno::EIO, format!("Corrupt log file {}: {}", path.display(), message.into()))
    }

    /// Create a file error for a store file
    pub fn file_error(path: &Path, err: &io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::NotFound => errno::ENOENT,
            io::ErrorKind::PermissionDenied => errno::EACCES,
            _ => errno::EIO,
        };
        Self::new(code, format!("File error for {}: {}", path.display(), err))
    }

    /// The negative status code
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        self.code == -errno::ENOENT
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::NotFound => errno::ENOENT,
            io::ErrorKind::PermissionDenied => errno::EACCES,
            _ => errno::EIO,
        };
        Self::new(code, format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(errno::EIO, format!("Serialization error: {}", err))
    }
}
