//! Warnings for databases left with fewer valid backups than configured.

use std::fmt;

/// A database whose surviving valid backups fall short of the retention count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionWarning {
    pub database: String,
    pub valid: usize,
    pub expected: usize,
}

impl RetentionWarning {
    pub fn shortfall(&self) -> usize {
        self.expected.saturating_sub(self.valid)
    }
}

impl fmt::Display for RetentionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} has {} valid backups, fewer than {} (short by {})",
            self.database,
            self.valid,
            self.expected,
            self.shortfall()
        )
    }
}

/// Receives retention warnings. Implementations must not fail.
pub trait WarningSink: Send + Sync {
    fn warn(&self, warning: &RetentionWarning);
}

/// Emits warnings through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl WarningSink for TracingSink {
    fn warn(&self, warning: &RetentionWarning) {
        tracing::warn!(
            database = %warning.database,
            valid = warning.valid,
            expected = warning.expected,
            shortfall = warning.shortfall(),
            "{}",
            warning
        );
    }
}

/// Warn through `sink` when `current - empty` is below `save_day`.
///
/// `empty` is the number of zero-byte backups counted during selection; it
/// is zero when compensation is off, so the raw count is compared.
pub fn report_if_below_threshold(
    sink: &dyn WarningSink,
    database: &str,
    current: usize,
    empty: usize,
    save_day: usize,
) -> Option<RetentionWarning> {
    let valid = current.saturating_sub(empty);
    if valid >= save_day {
        return None;
    }

    let warning = RetentionWarning {
        database: database.to_string(),
        valid,
        expected: save_day,
    };
    sink.warn(&warning);
    Some(warning)
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub warnings: Mutex<Vec<RetentionWarning>>,
    }

    impl RecordingSink {
        pub fn taken(&self) -> Vec<RetentionWarning> {
            self.warnings.lock().unwrap().clone()
        }
    }

    impl WarningSink for RecordingSink {
        fn warn(&self, warning: &RetentionWarning) {
            self.warnings.lock().unwrap().push(warning.clone());
        }
    }
}
