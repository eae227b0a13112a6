//! Error handling for shardlog
//!
//! This module provides error types and result aliases for log access operations.
//! Every error carries an errno-style status so callers can surface it the way
//! the log stores themselves report failures.

use std::io;
use thiserror::Error;

use crate::shard::StoreError;

/// errno values used for status reporting
pub mod errno {
    /// Operation not permitted
    pub const EPERM: i32 = 1;
    /// No such entry
    pub const ENOENT: i32 = 2;
    /// I/O error
    pub const EIO: i32 = 5;
    /// Permission denied
    pub const EACCES: i32 = 13;
    /// Resource busy
    pub const EBUSY: i32 = 16;
    /// Already exists
    pub const EEXIST: i32 = 17;
    /// Invalid argument
    pub const EINVAL: i32 = 22;
    /// No data available
    pub const ENODATA: i32 = 61;
}

/// Errors that can occur in log access operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing request input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown log family, bucket or lease
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lease held by another caller and not yet expired
    #[error("Shard is locked: {0}")]
    Busy(String),

    /// Unlock attempted by a caller that does not hold the lease
    #[error("Lease not owned by caller: {0}")]
    NotOwner(String),

    /// Failure reported by the underlying log store, passed through verbatim
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Errors related to I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors related to configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for log access operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a new not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a new busy error
    pub fn busy(message: impl Into<String>) -> Self {
        Self::Busy(message.into())
    }

    /// Create a new not owner error
    pub fn not_owner(message: impl Into<String>) -> Self {
        Self::NotOwner(message.into())
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this is an invalid argument error
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a busy error
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }

    /// Check if this is a not owner error
    pub fn is_not_owner(&self) -> bool {
        matches!(self, Self::NotOwner(_))
    }

    /// Check if this error came from the log store
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Negative errno-style status for this error.
    ///
    /// Store failures keep the code the store reported.
    pub fn status(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) | Self::Config(_) => -errno::EINVAL,
            Self::NotFound(_) => -errno::ENOENT,
            Self::Busy(_) => -errno::EBUSY,
            Self::NotOwner(_) => -errno::EPERM,
            Self::Store(err) => err.code(),
            Self::Io(_) | Self::Serialization(_) => -errno::EIO,
        }
    }

    /// HTTP status code for this error
    pub fn http_status(&self) -> u16 {
        http_status_for(self.status())
    }

    /// Get a user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::InvalidArgument(_) => Some("Fix the request parameters; this request will not succeed as sent".to_string()),
            Self::Busy(_) => Some("Another zone holds the shard lease; retry after backoff".to_string()),
            Self::NotOwner(_) => Some("Only the zone and locker that took the lease may release it".to_string()),
            Self::Io(err) if err.kind() == io::ErrorKind::NotFound => {
                Some("The log directory or shard file does not exist".to_string())
            }
            _ => None,
        }
    }
}

/// Map a negative errno-style status to an HTTP status code
pub fn http_status_for(status: i32) -> u16 {
    if status >= 0 {
        return 200;
    }
    match -status {
        errno::EINVAL => 400,
        errno::ENOENT => 404,
        errno::EPERM | errno::EACCES => 403,
        errno::EBUSY | errno::EEXIST => 409,
        _ => 500,
    }
}
