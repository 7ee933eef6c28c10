//! Bounded status feed
//!
//! Most-recent-first record of human-readable status events, capped at a
//! small retention limit. This is the user-visible feed rendered next to
//! the status badge, not the diagnostic log.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::LogEntry;

/// Bounded, newest-first log of status events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFeed {
    entries: VecDeque<LogEntry>,
    cap: usize,
}

impl LogFeed {
    /// Create a feed retaining at most `cap` entries
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Prepend an entry and truncate to the cap
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.cap);
    }

    /// Prepend an untimestamped message
    pub fn note(&mut self, message: impl Into<String>) {
        self.push(LogEntry::new(message));
    }

    /// Prepend a timestamped message
    pub fn note_at(&mut self, time: DateTime<Utc>, message: impl Into<String>) {
        self.push(LogEntry::at(time, message));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries newest first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Most recent entry, if any
    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }
}
