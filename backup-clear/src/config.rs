//! Configuration management for backup-clear.
//!
//! Loads configuration from a TOML file with environment variable overrides
//! (`BACKUP_CLEAR__RETENTION__SAVE_DAY=14`). A `.env` file is read first.
//! List keys take comma-separated values (`BACKUP_CLEAR__LOCAL__EXCLUDE=mysql,sys`).

use crate::engine::{CleanupEngine, DatabaseFilter, WarningSink};
use crate::retention::RetentionPolicy;
use crate::runner::Target;
use crate::storage::ConnectionInfo;
use crate::utils::{CleanupError, Result};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

const ENV_PREFIX: &str = "BACKUP_CLEAR";

/// Keys parsed as comma-separated lists when set from the environment.
const ENV_LIST_KEYS: [&str; 4] = [
    "local.exclude",
    "local.include",
    "remote.exclude",
    "remote.include",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Number of most recent backups kept per database
    #[serde(default = "default_save_day")]
    pub save_day: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Directory holding one sub-directory per database
    #[serde(default)]
    pub root: String,

    /// Keep extra backups for every empty dump among the newest ones
    #[serde(default = "default_true")]
    pub compensate_empty: bool,

    /// Databases never touched
    #[serde(default)]
    pub exclude: Vec<String>,

    /// If set, only these databases are cleaned
    #[serde(default)]
    pub include: Vec<String>,

    /// Report symlinked backups with their target's size and mtime
    #[serde(default)]
    pub follow_links: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub root: String,

    /// Apply `exclude`/`include` to the remote pass too
    #[serde(default)]
    pub honor_exclusions: bool,

    #[serde(default)]
    pub compensate_empty: bool,

    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub connection: Option<ConnectionInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Six-field cron expression (sec min hour day month weekday); unset = run once
    #[serde(default)]
    pub cron: Option<String>,
}

// Default values
fn default_save_day() -> usize {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            save_day: default_save_day(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root: String::new(),
            compensate_empty: default_true(),
            exclude: Vec::new(),
            include: Vec::new(),
            follow_links: false,
        }
    }
}

impl LocalConfig {
    pub fn policy(&self, save_day: usize) -> RetentionPolicy {
        RetentionPolicy::new(save_day).with_compensation(self.compensate_empty)
    }

    pub fn filter(&self) -> DatabaseFilter {
        build_filter(&self.exclude, &self.include)
    }
}

impl RemoteConfig {
    pub fn policy(&self, save_day: usize) -> RetentionPolicy {
        RetentionPolicy::new(save_day).with_compensation(self.compensate_empty)
    }

    /// True when a database list is configured but `honor_exclusions` is off.
    pub fn has_ignored_filter(&self) -> bool {
        !self.honor_exclusions && (!self.exclude.is_empty() || !self.include.is_empty())
    }

    pub fn filter(&self) -> DatabaseFilter {
        if self.honor_exclusions {
            build_filter(&self.exclude, &self.include)
        } else {
            DatabaseFilter::All
        }
    }
}

fn build_filter(exclude: &[String], include: &[String]) -> DatabaseFilter {
    if !include.is_empty() {
        DatabaseFilter::include(include.iter().cloned())
    } else if !exclude.is_empty() {
        DatabaseFilter::exclude(exclude.iter().cloned())
    } else {
        DatabaseFilter::All
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_sources(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn from_sources(path: Option<&Path>, env: Environment) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let env = ENV_LIST_KEYS
            .iter()
            .fold(env.list_separator(","), |env, key| env.with_list_parse_key(key));

        let config: Config = builder
            .add_source(env.prefix_separator("__").separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Parse configuration from TOML text, without environment overrides.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Reject configurations a run over every target cannot start with.
    pub fn validate(&self) -> Result<()> {
        self.validate_for(Target::All)
    }

    /// Reject configurations a run over `target` cannot start with. Only the
    /// selected targets are checked, and at least one of them must be enabled.
    pub fn validate_for(&self, target: Target) -> Result<()> {
        let local = target.includes_local() && self.local.enabled;
        let remote = target.includes_remote() && self.remote.enabled;

        if !local && !remote {
            return Err(CleanupError::Config(match target {
                Target::Local => "[local] cleanup is not enabled".into(),
                Target::Remote => "[remote] cleanup is not enabled".into(),
                Target::All => "neither [local] nor [remote] cleanup is enabled".into(),
            }));
        }

        if local {
            check_target("local", &self.local.root, &self.local.exclude, &self.local.include)?;
        }

        if remote {
            if self.remote.has_ignored_filter() {
                tracing::warn!(
                    exclude = ?self.remote.exclude,
                    include = ?self.remote.include,
                    "remote database list is ignored because honor_exclusions = false"
                );
            }

            check_target("remote", &self.remote.root, &self.remote.exclude, &self.remote.include)?;

            let conn = self.remote.connection.as_ref().ok_or_else(|| {
                CleanupError::Config("[remote.connection] is required for remote cleanup".into())
            })?;
            if conn.host.trim().is_empty() {
                return Err(CleanupError::Config("remote.connection.host is empty".into()));
            }
            if conn.password.is_none() && conn.key_file.is_none() {
                return Err(CleanupError::Config(
                    "remote.connection needs a password or a key_file".into(),
                ));
            }
        }

        if let Some(cron) = &self.schedule.cron {
            if cron.trim().is_empty() {
                return Err(CleanupError::Config("schedule.cron is empty".into()));
            }
        }

        Ok(())
    }

    pub fn local_engine(&self, sink: Arc<dyn WarningSink>) -> CleanupEngine {
        CleanupEngine::new(
            self.local.policy(self.retention.save_day),
            self.local.filter(),
            sink,
        )
    }

    pub fn remote_engine(&self, sink: Arc<dyn WarningSink>) -> CleanupEngine {
        CleanupEngine::new(
            self.remote.policy(self.retention.save_day),
            self.remote.filter(),
            sink,
        )
    }
}

fn check_target(section: &str, root: &str, exclude: &[String], include: &[String]) -> Result<()> {
    if root.trim().is_empty() {
        return Err(CleanupError::Config(format!("{section}.root is empty")));
    }
    if !exclude.is_empty() && !include.is_empty() {
        return Err(CleanupError::Config(format!(
            "{section}.include and {section}.exclude are mutually exclusive"
        )));
    }
    Ok(())
}
