//! Local filesystem backend.
//!
//! Lists a single directory level with `walkdir` and reads each entry's
//! metadata, so a failing stat is reported against the file, not the directory.

use super::{StorageBackend, StorageEntry};
use crate::utils::StorageError;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Backend over the local filesystem. Holds no open handles between calls.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    /// Follow symbolic links when reading entry metadata
    follow_links: bool,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report symlinks with their target's metadata. Broken links are then
    /// skipped instead of listed.
    pub fn with_follow_links(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }
}

impl StorageBackend for LocalBackend {
    fn list(&mut self, path: &str) -> Result<Vec<StorageEntry>, StorageError> {
        let root = Path::new(path);
        let dir_error = |source: io::Error| StorageError::Directory {
            path: path.to_string(),
            source,
        };

        // WalkDir yields a plain file as its own root; refuse that up front.
        let metadata = fs::metadata(root).map_err(dir_error)?;
        if !metadata.is_dir() {
            return Err(dir_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a directory",
            )));
        }

        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        let mut entries = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => return Err(dir_error(err.into())),
                Err(err) => {
                    let entry_path = err
                        .path()
                        .map(|p| p.to_string_lossy().to_string())
                        .unwrap_or_else(|| path.to_string());
                    return Err(StorageError::Entry {
                        path: entry_path,
                        source: err.into(),
                    });
                }
            };

            if let Some(storage_entry) = self.read_entry(&entry)? {
                entries.push(storage_entry);
            }
        }

        Ok(entries)
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        fs::remove_file(path).map_err(|source| StorageError::Remove {
            path: path.to_string(),
            source,
        })
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}

impl LocalBackend {
    /// Stat one entry. Broken symlinks are skipped.
    fn read_entry(&self, entry: &DirEntry) -> Result<Option<StorageEntry>, StorageError> {
        let entry_path = entry.path();
        let entry_error = |source: io::Error| StorageError::Entry {
            path: entry_path.to_string_lossy().to_string(),
            source,
        };

        let metadata = if entry.path_is_symlink() && self.follow_links {
            match fs::metadata(entry_path) {
                Ok(resolved) => resolved,
                Err(_) => {
                    tracing::debug!(path = %entry_path.display(), "Skipping broken symlink");
                    return Ok(None);
                }
            }
        } else {
            entry.metadata().map_err(|e| entry_error(e.into()))?
        };

        let modified = metadata.modified().map_err(entry_error)?;

        Ok(Some(StorageEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            is_dir: metadata.is_dir(),
            modified_at: DateTime::<Utc>::from(modified),
            size_bytes: if metadata.is_dir() { 0 } else { metadata.len() },
        }))
    }
}
