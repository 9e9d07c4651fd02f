//! Remote backend over an SSH/SFTP session.

use super::{ConnectionProvider, StorageBackend, StorageEntry};
use crate::utils::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ssh2::{Session, Sftp};
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Address and credentials of the remote backup host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub username: String,

    /// Password authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Private key authentication, tried when no password is set
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    #[serde(default)]
    pub passphrase: Option<String>,

    /// Deadline for the TCP connect and every blocking SSH call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_port() -> u16 {
    22
}

fn default_timeout_secs() -> u64 {
    30
}

impl ConnectionInfo {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Opens SFTP sessions from a [`ConnectionInfo`].
#[derive(Debug, Clone)]
pub struct SshConnector {
    info: ConnectionInfo,
}

impl SshConnector {
    pub fn new(info: ConnectionInfo) -> Self {
        Self { info }
    }

    fn open_session(&self) -> Result<Session, StorageError> {
        let info = &self.info;
        let timeout = Duration::from_secs(info.timeout_secs.max(1));

        let addr = info
            .address()
            .to_socket_addrs()
            .map_err(|e| connection_error("resolve", &info.address(), e))?
            .next()
            .ok_or_else(|| StorageError::Connection(format!("no address for {}", info.address())))?;

        let tcp = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| connection_error("connect", &info.address(), e))?;

        let mut sess = Session::new().map_err(|e| connection_error("session", &info.address(), e))?;
        sess.set_tcp_stream(tcp);
        sess.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
        sess.handshake()
            .map_err(|e| connection_error("handshake", &info.address(), e))?;

        let auth = match (&info.password, &info.key_file) {
            (Some(password), _) => sess.userauth_password(&info.username, password),
            (None, Some(key_file)) => sess.userauth_pubkey_file(
                &info.username,
                None,
                key_file,
                info.passphrase.as_deref(),
            ),
            (None, None) => {
                return Err(StorageError::Connection(format!(
                    "no password or key_file configured for {}@{}",
                    info.username, info.host
                )))
            }
        };
        auth.map_err(|e| StorageError::Connection(format!("SSH authentication failed: {}", e)))?;

        if !sess.authenticated() {
            return Err(StorageError::Connection("SSH authentication failed".into()));
        }

        Ok(sess)
    }
}

impl ConnectionProvider for SshConnector {
    type Session = SftpBackend;

    fn connect(&self) -> Result<SftpBackend, StorageError> {
        let sess = self.open_session()?;
        let sftp = match sess.sftp() {
            Ok(sftp) => sftp,
            Err(e) => {
                let _ = sess.disconnect(None, "sftp subsystem unavailable", None);
                return Err(StorageError::Connection(format!("SFTP channel failed: {}", e)));
            }
        };

        tracing::info!(host = %self.info.host, user = %self.info.username, "SFTP session opened");
        Ok(SftpBackend {
            host: self.info.host.clone(),
            sftp: Some(sftp),
            session: sess,
        })
    }
}

fn connection_error(step: &str, addr: &str, err: impl std::fmt::Display) -> StorageError {
    StorageError::Connection(format!("{} {} failed: {}", step, addr, err))
}

/// An open SFTP session. Dropping it closes the channel and disconnects.
pub struct SftpBackend {
    host: String,
    sftp: Option<Sftp>,
    session: Session,
}

impl SftpBackend {
    fn sftp(&self) -> Result<&Sftp, StorageError> {
        self.sftp
            .as_ref()
            .ok_or_else(|| StorageError::Connection("SFTP channel already closed".into()))
    }
}

impl StorageBackend for SftpBackend {
    fn list(&mut self, path: &str) -> Result<Vec<StorageEntry>, StorageError> {
        let listing = self
            .sftp()?
            .readdir(Path::new(path))
            .map_err(|e| StorageError::Directory {
                path: path.to_string(),
                source: io::Error::from(e),
            })?;

        let mut entries: Vec<StorageEntry> = listing
            .into_iter()
            .filter_map(|(entry_path, stat)| {
                let name = entry_path.file_name()?.to_string_lossy().to_string();
                if name == "." || name == ".." {
                    return None;
                }
                let modified_at = stat
                    .mtime
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0))
                    .unwrap_or_default();
                Some(StorageEntry {
                    name,
                    is_dir: stat.is_dir(),
                    modified_at,
                    // Servers that omit the size attribute report the file as empty.
                    size_bytes: stat.size.unwrap_or_default(),
                })
            })
            .collect();

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        self.sftp()?
            .unlink(Path::new(path))
            .map_err(|e| StorageError::Remove {
                path: path.to_string(),
                source: io::Error::from(e),
            })
    }

    fn kind(&self) -> &'static str {
        "sftp"
    }
}

impl Drop for SftpBackend {
    fn drop(&mut self) {
        drop(self.sftp.take());
        if let Err(e) = self.session.disconnect(None, "backup-clear finished", None) {
            tracing::debug!(host = %self.host, error = %e, "SSH disconnect failed");
        }
        tracing::info!(host = %self.host, "SFTP session closed");
    }
}
