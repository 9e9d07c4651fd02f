//! Error types for the cleanup engine.

use std::io;
use thiserror::Error;

/// Failure reported by a storage backend primitive.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("cannot list {path}: {source}")]
    Directory { path: String, source: io::Error },

    #[error("cannot read {path}: {source}")]
    Entry { path: String, source: io::Error },

    #[error("cannot remove {path}: {source}")]
    Remove { path: String, source: io::Error },

    #[error("connection error: {0}")]
    Connection(String),
}

/// Failure of a cleanup pass.
///
/// Every variant names the step that failed and carries the underlying cause,
/// so `{:#}` on an `anyhow` wrapper prints the full chain.
#[derive(Error, Debug)]
pub enum CleanupError {
    #[error("failed to read directory {path}")]
    DirectoryRead {
        path: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to read backup file {path}")]
    FileRead {
        path: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to delete old backup {path}")]
    Deletion {
        path: String,
        #[source]
        source: StorageError,
    },

    #[error("remote session failed")]
    Connection(#[source] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CleanupError {
    /// Classify a listing failure: a failed entry stat is a file read error,
    /// anything else means the directory itself could not be read.
    pub fn from_listing(path: &str, err: StorageError) -> Self {
        match err {
            StorageError::Entry { path: entry_path, source } => CleanupError::FileRead {
                path: entry_path.clone(),
                source: StorageError::Entry { path: entry_path, source },
            },
            conn @ StorageError::Connection(_) => CleanupError::Connection(conn),
            other => CleanupError::DirectoryRead {
                path: path.to_string(),
                source: other,
            },
        }
    }

    /// Path of the file or directory the failure is about, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            CleanupError::DirectoryRead { path, .. }
            | CleanupError::FileRead { path, .. }
            | CleanupError::Deletion { path, .. } => Some(path),
            CleanupError::Connection(_) | CleanupError::Config(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CleanupError>;
