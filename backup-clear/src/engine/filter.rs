//! Database enumeration under a backup root.

use crate::storage::StorageBackend;
use crate::utils::{CleanupError, Result};
use std::collections::HashSet;

/// Which database directories a pass may touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DatabaseFilter {
    /// Every database directory
    #[default]
    All,

    /// Skip the named databases
    Exclude(HashSet<String>),

    /// Only the named databases; an empty set means every database
    Include(HashSet<String>),
}

impl DatabaseFilter {
    pub fn exclude<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DatabaseFilter::Exclude(names.into_iter().map(Into::into).collect())
    }

    pub fn include<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DatabaseFilter::Include(names.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, database: &str) -> bool {
        match self {
            DatabaseFilter::All => true,
            DatabaseFilter::Exclude(names) => !names.contains(database),
            DatabaseFilter::Include(names) => names.is_empty() || names.contains(database),
        }
    }
}

/// Names of the database directories directly under `root` that `filter`
/// allows, sorted by name. Plain files under the root are ignored.
pub fn list_databases<B: StorageBackend>(
    backend: &mut B,
    root: &str,
    filter: &DatabaseFilter,
) -> Result<Vec<String>> {
    let entries = backend
        .list(root)
        .map_err(|e| CleanupError::from_listing(root, e))?;

    let mut databases: Vec<String> = entries
        .into_iter()
        .filter(|e| e.is_dir)
        .filter_map(|e| {
            if filter.allows(&e.name) {
                Some(e.name)
            } else {
                tracing::debug!(database = %e.name, "Skipping filtered database");
                None
            }
        })
        .collect();

    databases.sort();
    Ok(databases)
}
