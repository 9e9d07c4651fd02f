//! backup-clear library
//!
//! Count-based retention cleanup for database backup directories, on the
//! local filesystem or on a remote host over SFTP.

pub mod config;
pub mod daemon;
pub mod engine;
pub mod retention;
pub mod runner;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use engine::{CleanupEngine, DatabaseFilter, PassSummary};
pub use retention::{BackupEntry, RetentionPolicy};
pub use utils::errors::{CleanupError, Result};
