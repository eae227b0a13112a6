//! In-memory ordered entry sequence shared by the log store implementations.
//!
//! Entry ids are zero-padded append sequence numbers, so lexicographic order of
//! ids is append order and an id can be used directly as a resume marker.

use chrono::{DateTime, Utc};

use crate::cursor::Cursor;
use crate::entry::LogEntry;
use crate::shard::{ListBatch, ShardId, ShardInfo};
use crate::time::TimeRange;

/// Format an append sequence number as an entry id
pub(crate) fn format_entry_id(seq: u64) -> String {
    format!("{:020}", seq)
}

/// Parse an entry id produced by [`format_entry_id`]
pub(crate) fn parse_entry_id(id: &str) -> Option<u64> {
    id.parse::<u64>().ok()
}

/// The entries of one shard, in append order
#[derive(Debug, Clone)]
pub(crate) struct ShardLog {
    entries: Vec<LogEntry>,
    next_seq: u64,
}

impl Default for ShardLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 1,
        }
    }

    /// Rebuild a log from persisted entries.
    ///
    /// `next_seq` never moves backwards past an id already handed out, so ids
    /// are not reused after a trim.
    pub fn from_parts(entries: Vec<LogEntry>, next_seq: u64) -> Self {
        let after_last = entries
            .last()
            .and_then(|entry| parse_entry_id(&entry.id))
            .map_or(1, |seq| seq + 1);

        Self {
            entries,
            next_seq: next_seq.max(after_last).max(1),
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Build the entry that the next append would produce
    pub fn next_entry(&self, timestamp: DateTime<Utc>, payload: serde_json::Value) -> LogEntry {
        LogEntry::new(format_entry_id(self.next_seq), timestamp, payload)
    }

    /// Append an entry previously built by [`ShardLog::next_entry`]
    pub fn push(&mut self, entry: LogEntry) {
        self.next_seq += 1;
        self.entries.push(entry);
    }

    pub fn append(&mut self, timestamp: DateTime<Utc>, payload: serde_json::Value) -> LogEntry {
        let entry = self.next_entry(timestamp, payload);
        self.push(entry.clone());
        entry
    }

    /// Read the entries after `cursor` that fall in `range`.
    ///
    /// At most `min(max_entries, batch_limit)` entries are returned; `truncated`
    /// reports whether another matching entry exists after them.
    pub fn select(
        &self,
        range: &TimeRange,
        cursor: &Cursor,
        max_entries: usize,
        batch_limit: usize,
    ) -> ListBatch {
        let start = match cursor {
            Cursor::Beginning => 0,
            Cursor::After(marker) => self
                .entries
                .partition_point(|entry| entry.id.as_str() <= marker.as_str()),
        };

        let limit = max_entries.min(batch_limit);
        let mut matching = self.entries[start..]
            .iter()
            .filter(|entry| range.contains(&entry.timestamp));

        let entries: Vec<LogEntry> = matching.by_ref().take(limit).cloned().collect();
        let truncated = matching.next().is_some();

        let next_cursor = entries
            .last()
            .map(LogEntry::marker)
            .unwrap_or_else(|| cursor.clone());

        ListBatch {
            entries,
            next_cursor,
            truncated,
        }
    }

    /// Remove entries whose timestamps fall in `range`
    pub fn trim(&mut self, range: &TimeRange) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| !range.contains(&entry.timestamp));
        before - self.entries.len()
    }

    /// Remove entries whose ids fall in `[start_marker, end_marker]`
    pub fn trim_markers(&mut self, start_marker: &str, end_marker: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            entry.id.as_str() < start_marker || entry.id.as_str() > end_marker
        });
        before - self.entries.len()
    }

    pub fn info(&self, shard_id: ShardId) -> ShardInfo {
        match (self.entries.first(), self.entries.last()) {
            (Some(first), Some(last)) => ShardInfo {
                shard_id,
                entry_count: self.entries.len(),
                marker: last.id.clone(),
                last_update: Some(last.timestamp),
                oldest: Some(first.timestamp),
            },
            _ => ShardInfo::empty(shard_id),
        }
    }
}
