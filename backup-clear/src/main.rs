//! backup-clear - Main entry point
//!
//! Deletes old database backups beyond the configured retention count, once
//! or on a cron schedule.

use anyhow::{Context, Result};
use backup_clear::daemon::{CleanupScheduler, ShutdownCoordinator};
use backup_clear::engine::{TracingSink, WarningSink};
use backup_clear::runner::{run_targets, Target};
use backup_clear::{utils, Config};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of most recent backups to keep (overrides config)
    #[arg(short, long)]
    save_day: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run once and exit, even if a schedule is configured
    #[arg(long)]
    once: bool,

    /// Which storage to clean
    #[arg(short, long, value_enum, default_value_t = Target::All)]
    target: Target,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(save_day) = args.save_day {
        config.retention.save_day = save_day;
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    config.validate_for(args.target)?;

    tracing::info!(
        "Starting backup-clear v{} (save_day: {}, target: {:?})",
        env!("CARGO_PKG_VERSION"),
        config.retention.save_day,
        args.target
    );

    let sink: Arc<dyn WarningSink> = Arc::new(TracingSink);
    let config = Arc::new(config);

    match config.schedule.cron.clone() {
        Some(cron) if !args.once => run_scheduled(config, args.target, sink, &cron).await,
        _ => {
            let target = args.target;
            tokio::task::spawn_blocking(move || run_targets(&config, target, sink))
                .await
                .context("cleanup task panicked")??;
            Ok(())
        }
    }
}

async fn run_scheduled(
    config: Arc<Config>,
    target: Target,
    sink: Arc<dyn WarningSink>,
    cron: &str,
) -> Result<()> {
    let coordinator = ShutdownCoordinator::new();

    let scheduler = CleanupScheduler::new(config, target, sink, coordinator.token()).await?;
    scheduler
        .schedule(cron)
        .await
        .with_context(|| format!("invalid schedule.cron {:?}", cron))?;
    scheduler.start().await?;

    coordinator.wait_for_signal().await?;

    // Let a run that is already deleting files finish
    scheduler.wait_idle(Duration::from_secs(60)).await;
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler shutdown error: {}", e);
    }

    tracing::info!("backup-clear stopped");
    Ok(())
}
