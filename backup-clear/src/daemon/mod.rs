//! Long-running mode: cron-scheduled cleanup runs and signal handling.

pub mod scheduler;
pub mod shutdown;

pub use scheduler::CleanupScheduler;
pub use shutdown::ShutdownCoordinator;
