//! Count-based retention selection.
//!
//! Given the backups found in one database directory, decide which ones are
//! kept (the newest `save_day`, plus compensation for empty backups inside
//! that window) and which ones are deleted (everything strictly older).
//! Nothing in here touches storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// File name inside the database directory
    pub name: String,

    /// Last modification time, the sort key
    pub modified_at: DateTime<Utc>,

    /// Size in bytes; zero marks an incomplete or corrupt dump
    pub size_bytes: u64,
}

impl BackupEntry {
    pub fn new(name: impl Into<String>, modified_at: DateTime<Utc>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            modified_at,
            size_bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size_bytes == 0
    }
}

/// How many backups to keep and whether empty ones are compensated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Number of most recent backups to retain
    pub save_day: usize,

    /// Extend the retained window by the number of zero-byte backups found in it
    #[serde(default)]
    pub compensate_empty: bool,
}

impl RetentionPolicy {
    pub fn new(save_day: usize) -> Self {
        Self {
            save_day,
            compensate_empty: false,
        }
    }

    pub fn with_compensation(mut self, enabled: bool) -> Self {
        self.compensate_empty = enabled;
        self
    }
}

/// Backups of one database, always ordered oldest first.
#[derive(Debug, Clone, Default)]
pub struct BackupSet {
    entries: Vec<BackupEntry>,
}

impl BackupSet {
    /// Build a set from an unsorted listing. Ties on `modified_at` are broken
    /// by name so the order never depends on the listing order.
    pub fn new(mut entries: Vec<BackupEntry>) -> Self {
        entries.sort_by(|a, b| {
            a.modified_at
                .cmp(&b.modified_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BackupEntry] {
        &self.entries
    }

    /// Split the set into kept and deleted entries under `policy`.
    pub fn decide(self, policy: &RetentionPolicy) -> RetentionDecision {
        let total = self.entries.len();
        let mut retain = policy.save_day.min(total);

        let empty_in_window = if policy.compensate_empty {
            self.entries[total - retain..]
                .iter()
                .filter(|e| e.is_empty())
                .count()
        } else {
            0
        };

        // Never reach past the oldest entry.
        retain = (retain + empty_in_window).min(total);

        let mut entries = self.entries;
        let keep = entries.split_off(total - retain);

        tracing::debug!(
            total,
            keep = keep.len(),
            delete = entries.len(),
            empty_in_window,
            "Retention decided"
        );

        RetentionDecision {
            keep,
            delete: entries,
            empty_in_window,
        }
    }
}

/// The outcome of applying a [`RetentionPolicy`] to a [`BackupSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionDecision {
    /// Retained entries, oldest first
    pub keep: Vec<BackupEntry>,

    /// Entries to remove, oldest first; all strictly older than `keep`
    pub delete: Vec<BackupEntry>,

    /// Zero-byte entries found in the nominal retained window
    pub empty_in_window: usize,
}

/// Pure selection helper: the entries to delete, oldest first.
pub fn select_for_deletion(entries: Vec<BackupEntry>, policy: &RetentionPolicy) -> Vec<BackupEntry> {
    BackupSet::new(entries).decide(policy).delete
}
