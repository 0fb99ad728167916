//! SSH connection settings.

use std::path::PathBuf;
use std::time::Duration;

use log::{info, warn};
use russh::keys::PublicKey;
use secrecy::SecretString;

use crate::error::TransportError;

/// How server host keys are checked, after OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostKeyVerification {
    /// Only hosts already in known_hosts are accepted.
    Strict,

    /// Unknown hosts are recorded on first use; changed keys are rejected.
    #[default]
    AcceptNew,

    /// Any key is accepted. Lab use only.
    Disabled,
}

/// Host key verification mode plus the known_hosts file it consults.
#[derive(Debug, Clone, Default)]
pub struct HostKeyPolicy {
    /// Verification mode.
    pub mode: HostKeyVerification,

    /// known_hosts file; `~/.ssh/known_hosts` when unset.
    pub known_hosts: Option<PathBuf>,
}

impl HostKeyPolicy {
    /// Decide whether `key` is acceptable for `host:port`.
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> Result<(), TransportError> {
        let known = match self.mode {
            HostKeyVerification::Disabled => return Ok(()),
            _ => self.lookup(host, port, key)?,
        };

        match (known, self.mode) {
            (true, _) => Ok(()),
            (false, HostKeyVerification::Strict) => Err(TransportError::HostKeyUnknown {
                host: host.to_string(),
                port,
            }),
            (false, _) => {
                info!("ssh: learning host key for {}:{}", host, port);
                if let Err(e) = self.learn(host, port, key) {
                    warn!("ssh: could not record host key: {}", e);
                }
                Ok(())
            }
        }
    }

    fn lookup(&self, host: &str, port: u16, key: &PublicKey) -> Result<bool, TransportError> {
        let found = match &self.known_hosts {
            Some(path) => russh::keys::check_known_hosts_path(host, port, key, path),
            None => russh::keys::check_known_hosts(host, port, key),
        };

        found.map_err(|e| match e {
            russh::keys::Error::KeyChanged { line } => TransportError::HostKeyChanged {
                host: host.to_string(),
                port,
                line,
            },
            other => TransportError::KnownHosts(other.to_string()),
        })
    }

    fn learn(&self, host: &str, port: u16, key: &PublicKey) -> Result<(), TransportError> {
        let learned = match &self.known_hosts {
            Some(path) => russh::keys::known_hosts::learn_known_hosts_path(host, port, key, path),
            None => russh::keys::known_hosts::learn_known_hosts(host, port, key),
        };
        learned.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }
}

/// Everything needed to reach and log in to a device over SSH.
#[derive(Debug)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,

    /// Bounds the TCP connect, and the SSH inactivity timeout.
    pub timeout: Duration,

    /// PTY columns. Wide terminals keep devices from wrapping long lines.
    pub terminal_width: u32,

    /// PTY rows.
    pub terminal_height: u32,

    pub host_keys: HostKeyPolicy,
}

impl SshConfig {
    /// Settings for `username@host:22`, no authentication, 30s timeout.
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            auth: AuthMethod::None,
            timeout: Duration::from_secs(30),
            terminal_width: 511,
            terminal_height: 24,
            host_keys: HostKeyPolicy::default(),
        }
    }

    /// `host:port`, for logging and connecting.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// How the SSH user authenticates. Secrets never appear in `Debug` output.
#[derive(Debug)]
pub enum AuthMethod {
    /// The `none` method (devices that authenticate inside the shell).
    None,

    Password(SecretString),

    /// An OpenSSH private key file, optionally encrypted.
    PrivateKey {
        path: PathBuf,
        passphrase: Option<SecretString>,
    },
}
