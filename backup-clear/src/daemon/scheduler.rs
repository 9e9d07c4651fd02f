use crate::config::Config;
use crate::engine::WarningSink;
use crate::runner::{run_targets, Target};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

/// Runs cleanup on a cron schedule. Ticks never overlap: a tick that fires
/// while a run is still deleting files is skipped.
pub struct CleanupScheduler {
    scheduler: Mutex<JobScheduler>,
    config: Arc<Config>,
    target: Target,
    sink: Arc<dyn WarningSink>,
    running: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl CleanupScheduler {
    pub async fn new(
        config: Arc<Config>,
        target: Target,
        sink: Arc<dyn WarningSink>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            config,
            target,
            sink,
            running: Arc::new(AtomicBool::new(false)),
            shutdown,
        })
    }

    pub async fn schedule(&self, cron_expression: &str) -> anyhow::Result<()> {
        let config = self.config.clone();
        let target = self.target;
        let sink = self.sink.clone();
        let running = self.running.clone();
        let shutdown = self.shutdown.clone();

        let job = Job::new_async(cron_expression, move |_uuid, _lock| {
            let config = config.clone();
            let sink = sink.clone();
            let running = running.clone();
            let shutdown = shutdown.clone();
            Box::pin(async move {
                if shutdown.is_cancelled() {
                    return;
                }
                if running.swap(true, Ordering::SeqCst) {
                    tracing::warn!("Skipping scheduled cleanup: previous run still in progress");
                    return;
                }

                tracing::info!(?target, "Starting scheduled cleanup");
                let result = tokio::task::spawn_blocking(move || run_targets(&config, target, sink)).await;
                match result {
                    Ok(Ok(report)) => {
                        tracing::info!(deleted = report.total_deleted(), "Scheduled cleanup finished")
                    }
                    Ok(Err(e)) => tracing::error!(error = %format!("{:#}", e), "Scheduled cleanup failed"),
                    Err(e) => tracing::error!(error = %e, "Scheduled cleanup task panicked"),
                }
                running.store(false, Ordering::SeqCst);
            })
        })?;

        self.scheduler.lock().await.add(job).await?;
        tracing::info!(cron = %cron_expression, "Cleanup scheduled");
        Ok(())
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait up to `timeout` for an in-flight run to finish.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while self.is_running() {
            if start.elapsed() >= timeout {
                tracing::warn!("Cleanup still running at shutdown timeout");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        true
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.shutdown().await?;
        Ok(())
    }
}
