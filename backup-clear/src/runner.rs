//! Runs the configured cleanup targets once.
//!
//! Local and remote are separate passes. Both are attempted; if either fails
//! the first failure is returned after the other one has run.

use crate::config::Config;
use crate::engine::{PassSummary, WarningSink};
use crate::storage::{LocalBackend, SshConnector};
use crate::utils::CleanupError;
use anyhow::Context;
use clap::ValueEnum;
use std::sync::Arc;
use std::time::Instant;

/// Which storage a run cleans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Target {
    Local,
    Remote,
    #[default]
    All,
}

impl Target {
    pub fn includes_local(self) -> bool {
        matches!(self, Target::Local | Target::All)
    }

    pub fn includes_remote(self) -> bool {
        matches!(self, Target::Remote | Target::All)
    }
}

/// Summaries of the passes that ran.
#[derive(Debug, Default)]
pub struct RunReport {
    pub local: Option<PassSummary>,
    pub remote: Option<PassSummary>,
}

impl RunReport {
    pub fn total_deleted(&self) -> usize {
        self.local.iter().chain(self.remote.iter()).map(|s| s.total_deleted()).sum()
    }
}

/// Run every enabled pass selected by `target`. Blocking.
pub fn run_targets(
    config: &Config,
    target: Target,
    sink: Arc<dyn WarningSink>,
) -> anyhow::Result<RunReport> {
    let started = Instant::now();
    let mut report = RunReport::default();
    let mut first_error: Option<anyhow::Error> = None;

    if target.includes_local() && config.local.enabled {
        let engine = config.local_engine(sink.clone());
        let mut backend = LocalBackend::new().with_follow_links(config.local.follow_links);
        match engine
            .run_pass(&mut backend, &config.local.root)
            .with_context(|| format!("local cleanup of {} failed", config.local.root))
        {
            Ok(summary) => report.local = Some(summary),
            Err(e) => {
                tracing::error!("{:#}", e);
                first_error.get_or_insert(e);
            }
        }
    }

    if target.includes_remote() && config.remote.enabled {
        match run_remote(config, sink) {
            Ok(summary) => report.remote = Some(summary),
            Err(e) => {
                tracing::error!("{:#}", e);
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    tracing::info!(
        deleted = report.total_deleted(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Cleanup run complete"
    );
    Ok(report)
}

fn run_remote(config: &Config, sink: Arc<dyn WarningSink>) -> anyhow::Result<PassSummary> {
    let conn = config
        .remote
        .connection
        .clone()
        .ok_or_else(|| CleanupError::Config("[remote.connection] is missing".into()))?;
    let host = conn.address();

    let summary = config
        .remote_engine(sink)
        .clear_remote(&SshConnector::new(conn), &config.remote.root)
        .with_context(|| format!("remote cleanup of {}:{} failed", host, config.remote.root))?;
    Ok(summary)
}
