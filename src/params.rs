//! Request parameters
//!
//! Parameters arrive as string key/value pairs. A missing parameter reads as
//! the empty string, which is how most handlers test for "required".

use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::error::{Result, Error};
use crate::shard::ShardId;

/// String parameters attached to a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params(HashMap<String, String>);

impl Params {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, builder style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a parameter
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a parameter, or the empty string when it is absent
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map_or("", String::as_str)
    }

    /// Check if a parameter was supplied at all, even with an empty value
    pub fn exists(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Return the first of `keys` whose value is empty
    pub fn first_missing<'a>(&self, keys: &[&'a str]) -> Option<&'a str> {
        keys.iter().copied().find(|key| self.get(key).is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Parse a shard id. The whole string must be an unsigned integer.
pub fn parse_shard_id(value: &str) -> Result<ShardId> {
    value.parse::<ShardId>().map_err(|_| {
        debug!(id = value, "error parsing shard id");
        Error::invalid_argument(format!("Invalid shard id: {:?}", value))
    })
}

/// Parse a strictly positive integer parameter
pub fn parse_positive(name: &str, value: &str) -> Result<u64> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => {
            debug!(param = name, value, "invalid positive integer");
            Err(Error::invalid_argument(format!("Invalid {}: {:?}", name, value)))
        }
    }
}

/// Parse an optional `max-entries` value.
///
/// Absent or empty means `default`. A present value must be a positive integer.
pub fn parse_max_entries(value: &str, default: usize) -> Result<usize> {
    if value.is_empty() {
        return Ok(default);
    }
    let n = parse_positive("max-entries", value)?;
    Ok(usize::try_from(n).unwrap_or(usize::MAX))
}

/// Parse `max-entries`, falling back to `default` on anything that is not a positive integer
pub fn max_entries_or_default(value: &str, default: usize) -> usize {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => default,
    }
}
