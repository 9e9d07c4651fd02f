//! Sequential, fail-fast removal of selected backups.

use crate::retention::BackupEntry;
use crate::storage::{join_path, StorageBackend};
use crate::utils::{CleanupError, Result};

/// Remove every entry of `delete` from `database_path`, in order.
///
/// Stops at the first failure and returns it with the failing path. Files
/// removed before the failure stay removed. Returns the number removed.
pub fn delete_all<B: StorageBackend>(
    backend: &mut B,
    database_path: &str,
    delete: &[BackupEntry],
) -> Result<usize> {
    for (removed, entry) in delete.iter().enumerate() {
        let path = join_path(database_path, &entry.name);
        if let Err(source) = backend.remove(&path) {
            tracing::error!(path = %path, removed, "Deleting old backup failed");
            return Err(CleanupError::Deletion { path, source });
        }
        tracing::info!(
            path = %path,
            modified_at = %entry.modified_at.format("%Y-%m-%d %H:%M:%S"),
            size = entry.size_bytes,
            "Removed old backup"
        );
    }

    Ok(delete.len())
}
