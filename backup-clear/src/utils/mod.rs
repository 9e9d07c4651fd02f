//! Utility modules for backup-clear.

pub mod errors;
pub mod logger;

pub use errors::{CleanupError, Result, StorageError};
