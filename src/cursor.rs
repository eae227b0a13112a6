//! Pagination cursors
//!
//! A cursor is an opaque resume token owned by the caller. It is either the
//! beginning of a shard or the marker of the last entry the caller has seen.
//! Its contents are never interpreted here; only the log store understands them.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Opaque "resume after this point" token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Cursor {
    /// Start of the log
    #[default]
    Beginning,
    /// Resume after the entry with this marker
    After(String),
}

impl Cursor {
    /// The cursor for the start of the log
    pub fn beginning() -> Self {
        Self::Beginning
    }

    /// Create a cursor from a marker. An empty marker means the beginning.
    pub fn after(marker: impl Into<String>) -> Self {
        let marker = marker.into();
        if marker.is_empty() {
            Self::Beginning
        } else {
            Self::After(marker)
        }
    }

    /// Check if this cursor points at the start of the log
    pub fn is_beginning(&self) -> bool {
        matches!(self, Self::Beginning)
    }

    /// The marker string, empty for the beginning
    pub fn as_marker(&self) -> &str {
        match self {
            Self::Beginning => "",
            Self::After(marker) => marker,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_marker())
    }
}

impl From<String> for Cursor {
    fn from(marker: String) -> Self {
        Self::after(marker)
    }
}

impl From<&str> for Cursor {
    fn from(marker: &str) -> Self {
        Self::after(marker)
    }
}

impl From<Cursor> for String {
    fn from(cursor: Cursor) -> Self {
        match cursor {
            Cursor::Beginning => String::new(),
            Cursor::After(marker) => marker,
        }
    }
}
