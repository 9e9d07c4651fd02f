//! Storage backends the cleanup engine runs against.
//!
//! A backend only knows how to list one directory level and remove a file.
//! The local filesystem and an SFTP session both implement [`StorageBackend`];
//! remote sessions are opened through a [`ConnectionProvider`].

pub mod local;
pub mod sftp;

use crate::retention::BackupEntry;
use crate::utils::StorageError;
use chrono::{DateTime, Utc};

pub use local::LocalBackend;
pub use sftp::{ConnectionInfo, SftpBackend, SshConnector};

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub name: String,
    pub is_dir: bool,
    pub modified_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl StorageEntry {
    /// The backup view of a non-directory entry.
    pub fn into_backup(self) -> Option<BackupEntry> {
        if self.is_dir {
            return None;
        }
        Some(BackupEntry::new(self.name, self.modified_at, self.size_bytes))
    }
}

/// Listing and removal primitives.
pub trait StorageBackend {
    /// List the immediate children of `path`.
    fn list(&mut self, path: &str) -> Result<Vec<StorageEntry>, StorageError>;

    /// Remove the file at `path`.
    fn remove(&mut self, path: &str) -> Result<(), StorageError>;

    /// Short label used in log lines ("local", "sftp").
    fn kind(&self) -> &'static str;
}

/// Opens a remote session. Dropping the session closes it.
pub trait ConnectionProvider {
    type Session: StorageBackend;

    fn connect(&self) -> Result<Self::Session, StorageError>;
}

/// Join a directory and a child name with a single `/`.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        return name.to_string();
    }
    format!("{}/{}", dir.trim_end_matches('/'), name)
}
