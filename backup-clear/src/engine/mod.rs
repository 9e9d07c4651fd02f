//! Cleanup engine - runs one retention pass over a backup root.
//!
//! A pass enumerates the database directories under the root, then for each
//! database, strictly in sequence:
//! - lists its backups
//! - selects the ones beyond the retention count
//! - deletes them, stopping at the first failure
//! - re-lists the directory and warns if too few valid backups remain
//!
//! The first error ends the whole pass; databases after it are not touched.

pub mod deleter;
pub mod filter;
pub mod report;

use crate::retention::{BackupEntry, BackupSet, RetentionPolicy};
use crate::storage::{join_path, ConnectionProvider, StorageBackend};
use crate::utils::{CleanupError, Result};
use std::sync::Arc;

pub use deleter::delete_all;
pub use filter::{list_databases, DatabaseFilter};
pub use report::{report_if_below_threshold, RetentionWarning, TracingSink, WarningSink};

/// Outcome for one database directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseSummary {
    pub database: String,
    pub listed: usize,
    pub deleted: usize,
    pub empty_in_window: usize,
    pub remaining: usize,
    pub warning: Option<RetentionWarning>,
}

/// Outcome of a whole pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub root: String,
    pub databases: Vec<DatabaseSummary>,
}

impl PassSummary {
    pub fn total_deleted(&self) -> usize {
        self.databases.iter().map(|d| d.deleted).sum()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &RetentionWarning> {
        self.databases.iter().filter_map(|d| d.warning.as_ref())
    }
}

/// Retention engine, independent of where the backups live.
#[derive(Clone)]
pub struct CleanupEngine {
    policy: RetentionPolicy,
    filter: DatabaseFilter,
    sink: Arc<dyn WarningSink>,
}

impl CleanupEngine {
    pub fn new(policy: RetentionPolicy, filter: DatabaseFilter, sink: Arc<dyn WarningSink>) -> Self {
        Self {
            policy,
            filter,
            sink,
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Run one pass over `root` on an already available backend.
    pub fn run_pass<B: StorageBackend>(&self, backend: &mut B, root: &str) -> Result<PassSummary> {
        tracing::info!(
            backend = backend.kind(),
            root,
            save_day = self.policy.save_day,
            compensate_empty = self.policy.compensate_empty,
            "Starting cleanup pass"
        );

        let databases = list_databases(backend, root, &self.filter)?;
        let mut summary = PassSummary {
            root: root.to_string(),
            databases: Vec::with_capacity(databases.len()),
        };

        for database in databases {
            summary.databases.push(self.clear_database(backend, root, &database)?);
        }

        tracing::info!(
            backend = backend.kind(),
            root,
            databases = summary.databases.len(),
            deleted = summary.total_deleted(),
            "Cleanup pass finished"
        );
        Ok(summary)
    }

    /// Connect through `provider`, run a pass, and disconnect. The session is
    /// dropped, and so closed, whether the pass succeeds or not.
    pub fn clear_remote<P: ConnectionProvider>(&self, provider: &P, root: &str) -> Result<PassSummary> {
        let mut session = provider.connect().map_err(CleanupError::Connection)?;
        let result = self.run_pass(&mut session, root);
        drop(session);
        result
    }

    fn clear_database<B: StorageBackend>(
        &self,
        backend: &mut B,
        root: &str,
        database: &str,
    ) -> Result<DatabaseSummary> {
        let path = join_path(root, database);

        let set = BackupSet::new(list_backups(backend, &path)?);
        let listed = set.len();
        let decision = set.decide(&self.policy);

        tracing::debug!(
            database,
            listed,
            keep = decision.keep.len(),
            delete = decision.delete.len(),
            "Selected backups for deletion"
        );

        let deleted = delete_all(backend, &path, &decision.delete)?;

        let remaining = list_backups(backend, &path)?.len();
        let warning = report_if_below_threshold(
            self.sink.as_ref(),
            database,
            remaining,
            decision.empty_in_window,
            self.policy.save_day,
        );

        Ok(DatabaseSummary {
            database: database.to_string(),
            listed,
            deleted,
            empty_in_window: decision.empty_in_window,
            remaining,
            warning,
        })
    }
}

/// Backup files of one database directory; sub-directories are ignored.
fn list_backups<B: StorageBackend>(backend: &mut B, path: &str) -> Result<Vec<BackupEntry>> {
    let entries = backend
        .list(path)
        .map_err(|e| CleanupError::from_listing(path, e))?;
    Ok(entries.into_iter().filter_map(|e| e.into_backup()).collect())
}

#[cfg(test)]
mod tests {
    use super::report::recording::RecordingSink;
    use super::*;
    use crate::storage::memory::{Call, MemoryBackend};
    use crate::storage::{LocalBackend, StorageEntry};
    use crate::utils::StorageError;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 3, 30, 0).unwrap()
    }

    /// Root with `app` holding five daily backups and `billing` holding two.
    fn scenario() -> MemoryBackend {
        let mut backend = MemoryBackend::new();
        backend.add_dir("/backup", "app");
        backend.add_dir("/backup", "billing");
        for day in 1..=5 {
            backend.add_file("/backup/app", &format!("app_{day}.sql.gz"), at(day), 100);
        }
        for day in 4..=5 {
            backend.add_file("/backup/billing", &format!("billing_{day}.sql.gz"), at(day), 100);
        }
        backend
    }

    fn engine(save_day: usize, filter: DatabaseFilter) -> (CleanupEngine, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let engine = CleanupEngine::new(RetentionPolicy::new(save_day), filter, sink.clone());
        (engine, sink)
    }

    #[test]
    fn test_app_and_billing_scenario() {
        let mut backend = scenario();
        let (engine, sink) = engine(3, DatabaseFilter::All);

        let summary = engine.run_pass(&mut backend, "/backup").unwrap();

        assert_eq!(
            backend.file_names("/backup/app"),
            vec!["app_3.sql.gz", "app_4.sql.gz", "app_5.sql.gz"]
        );
        assert_eq!(backend.file_names("/backup/billing").len(), 2);
        assert_eq!(summary.total_deleted(), 2);

        let warnings = sink.taken();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].database, "billing");
        assert_eq!(warnings[0].shortfall(), 1);
        assert_eq!(summary.warnings().count(), 1);
    }

    #[test]
    fn test_second_pass_deletes_nothing() {
        let mut backend = scenario();
        let (engine, _) = engine(3, DatabaseFilter::All);

        engine.run_pass(&mut backend, "/backup").unwrap();
        backend.calls.clear();
        let second = engine.run_pass(&mut backend, "/backup").unwrap();

        assert_eq!(second.total_deleted(), 0);
        assert!(backend.removed().is_empty());
    }

    #[test]
    fn test_excluded_database_is_never_touched() {
        let mut backend = scenario();
        let (engine, _) = engine(1, DatabaseFilter::exclude(["app"]));

        let summary = engine.run_pass(&mut backend, "/backup").unwrap();

        assert!(!backend.touched("/backup/app"));
        assert_eq!(backend.file_names("/backup/app").len(), 5);
        assert_eq!(summary.databases.len(), 1);
        assert_eq!(backend.file_names("/backup/billing"), vec!["billing_5.sql.gz"]);
    }

    #[test]
    fn test_include_mode_only_cleans_named() {
        let mut backend = scenario();
        let (engine, _) = engine(1, DatabaseFilter::include(["billing"]));

        engine.run_pass(&mut backend, "/backup").unwrap();

        assert!(!backend.touched("/backup/app"));
        assert_eq!(backend.file_names("/backup/billing"), vec!["billing_5.sql.gz"]);
    }

    #[test]
    fn test_deletion_failure_stops_the_pass() {
        let mut backend = scenario();
        backend.fail_remove.insert("/backup/app/app_2.sql.gz".into());
        let (engine, _) = engine(2, DatabaseFilter::All);

        let err = engine.run_pass(&mut backend, "/backup").unwrap_err();

        assert!(matches!(err, CleanupError::Deletion { .. }));
        assert_eq!(err.path(), Some("/backup/app/app_2.sql.gz"));
        assert_eq!(
            backend.file_names("/backup/app"),
            vec!["app_2.sql.gz", "app_3.sql.gz", "app_4.sql.gz", "app_5.sql.gz"]
        );
        assert!(!backend.calls.contains(&Call::Remove("/backup/app/app_3.sql.gz".into())));
        // Databases after the failing one are not processed.
        assert!(!backend.touched("/backup/billing"));
    }

    #[test]
    fn test_unreadable_database_is_fatal() {
        let mut backend = scenario();
        backend.fail_list.insert("/backup/app".into());
        let (engine, _) = engine(3, DatabaseFilter::All);

        let err = engine.run_pass(&mut backend, "/backup").unwrap_err();
        assert!(matches!(err, CleanupError::DirectoryRead { .. }));
        assert_eq!(err.path(), Some("/backup/app"));
        assert!(!backend.touched("/backup/billing"));
    }

    #[test]
    fn test_nested_directories_are_not_backups() {
        let mut backend = scenario();
        backend.add_dir("/backup/app", "tmp");
        let (engine, _) = engine(3, DatabaseFilter::All);

        let summary = engine.run_pass(&mut backend, "/backup").unwrap();
        assert_eq!(summary.databases[0].listed, 5);
        assert!(!backend.removed().iter().any(|p| p.ends_with("/tmp")));
    }

    #[test]
    fn test_compensated_pass_warns_on_valid_count() {
        let mut backend = MemoryBackend::new();
        backend.add_dir("/backup", "app");
        for day in 1..=4 {
            backend.add_file("/backup/app", &format!("app_{day}.sql.gz"), at(day), 100);
        }
        backend.add_file("/backup/app", "app_5.sql.gz", at(5), 0);

        let sink = Arc::new(RecordingSink::default());
        let policy = RetentionPolicy::new(2).with_compensation(true);
        let engine = CleanupEngine::new(policy, DatabaseFilter::All, sink.clone());

        let summary = engine.run_pass(&mut backend, "/backup").unwrap();

        assert_eq!(
            backend.file_names("/backup/app"),
            vec!["app_3.sql.gz", "app_4.sql.gz", "app_5.sql.gz"]
        );
        assert_eq!(summary.databases[0].empty_in_window, 1);
        // Three files remain, one of them empty: exactly two valid.
        assert!(sink.taken().is_empty());
    }

    /// Session over a shared in-memory backend that counts how often it is closed.
    struct CountingSession {
        inner: Arc<Mutex<MemoryBackend>>,
        closed: Arc<AtomicUsize>,
    }

    impl StorageBackend for CountingSession {
        fn list(&mut self, path: &str) -> std::result::Result<Vec<StorageEntry>, StorageError> {
            self.inner.lock().unwrap().list(path)
        }

        fn remove(&mut self, path: &str) -> std::result::Result<(), StorageError> {
            self.inner.lock().unwrap().remove(path)
        }

        fn kind(&self) -> &'static str {
            "counting"
        }
    }

    impl Drop for CountingSession {
        fn drop(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeProvider {
        backend: Arc<Mutex<MemoryBackend>>,
        closed: Arc<AtomicUsize>,
        refuse: bool,
    }

    impl FakeProvider {
        fn new(backend: MemoryBackend) -> Self {
            Self {
                backend: Arc::new(Mutex::new(backend)),
                closed: Arc::new(AtomicUsize::new(0)),
                refuse: false,
            }
        }
    }

    impl ConnectionProvider for FakeProvider {
        type Session = CountingSession;

        fn connect(&self) -> std::result::Result<CountingSession, StorageError> {
            if self.refuse {
                return Err(StorageError::Connection("handshake failed".into()));
            }
            Ok(CountingSession {
                inner: self.backend.clone(),
                closed: self.closed.clone(),
            })
        }
    }

    #[test]
    fn test_remote_pass_closes_session() {
        let provider = FakeProvider::new(scenario());
        let (engine, _) = engine(3, DatabaseFilter::All);

        let summary = engine.clear_remote(&provider, "/backup").unwrap();

        assert_eq!(summary.total_deleted(), 2);
        assert_eq!(provider.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remote_session_closed_on_enumeration_failure() {
        let provider = FakeProvider::new(scenario());
        let (engine, _) = engine(3, DatabaseFilter::All);

        let err = engine.clear_remote(&provider, "/missing").unwrap_err();

        assert!(matches!(err, CleanupError::DirectoryRead { .. }));
        assert_eq!(provider.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remote_session_closed_on_deletion_failure() {
        let mut backend = scenario();
        backend.fail_remove.insert("/backup/app/app_1.sql.gz".into());
        let provider = FakeProvider::new(backend);
        let (engine, _) = engine(3, DatabaseFilter::All);

        let err = engine.clear_remote(&provider, "/backup").unwrap_err();

        assert!(matches!(err, CleanupError::Deletion { .. }));
        assert_eq!(provider.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remote_connect_failure() {
        let mut provider = FakeProvider::new(scenario());
        provider.refuse = true;
        let (engine, _) = engine(3, DatabaseFilter::All);

        let err = engine.clear_remote(&provider, "/backup").unwrap_err();

        assert!(matches!(err, CleanupError::Connection(_)));
        assert_eq!(provider.closed.load(Ordering::SeqCst), 0);
        assert!(provider.backend.lock().unwrap().calls.is_empty());
    }

    #[test]
    fn test_local_pass_on_real_directories() -> std::io::Result<()> {
        use std::fs;
        use std::time::{Duration, SystemTime};

        let temp_dir = tempfile::TempDir::new()?;
        let app = temp_dir.path().join("app");
        let skipped = temp_dir.path().join("mysql");
        fs::create_dir(&app)?;
        fs::create_dir(&skipped)?;

        let now = SystemTime::now();
        for age in 0..5u64 {
            let file = app.join(format!("app_{age}.sql"));
            // The newest dump is empty.
            let content: &[u8] = if age == 0 { b"" } else { b"dump" };
            fs::write(&file, content)?;
            fs::File::options()
                .write(true)
                .open(&file)?
                .set_modified(now - Duration::from_secs(age * 86_400))?;
        }
        fs::write(skipped.join("mysql_0.sql"), b"dump")?;

        let sink = Arc::new(RecordingSink::default());
        let policy = RetentionPolicy::new(2).with_compensation(true);
        let engine = CleanupEngine::new(policy, DatabaseFilter::exclude(["mysql"]), sink.clone());

        let root = temp_dir.path().to_string_lossy().to_string();
        let summary = engine.run_pass(&mut LocalBackend::new(), &root).unwrap();

        assert_eq!(summary.total_deleted(), 2);
        assert!(app.join("app_0.sql").exists());
        assert!(app.join("app_1.sql").exists());
        assert!(app.join("app_2.sql").exists());
        assert!(!app.join("app_3.sql").exists());
        assert!(!app.join("app_4.sql").exists());
        assert!(skipped.join("mysql_0.sql").exists());
        assert!(sink.taken().is_empty());
        Ok(())
    }
}
