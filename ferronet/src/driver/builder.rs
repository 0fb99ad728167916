//! Assembles a [`Session`] from connection settings and a platform.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use super::session::Session;
use crate::channel::ChannelConfig;
use crate::error::{DriverError, Result};
use crate::platform::PlatformDefinition;
use crate::transport::{AuthMethod, HostKeyPolicy, HostKeyVerification, SshConfig, SshTransport, Transport};

/// Collects connection, channel and privilege settings for one device.
///
/// Sessions come out with the platform's [`DefaultHooks`](super::DefaultHooks);
/// swap them with [`Session::with_hooks`].
///
/// # Example
///
/// ```rust,no_run
/// use ferronet::driver::{SendOptions, SessionBuilder};
/// use ferronet::platform::{PlatformDefinition, PrivilegeLevel};
///
/// # async fn example() -> Result<(), ferronet::Error> {
/// let platform = PlatformDefinition::new("lab")
///     .with_privilege(PrivilegeLevel::new("exec", r"(?m)^\S+>\s*$")?)
///     .with_privilege(
///         PrivilegeLevel::new("privilege_exec", r"(?m)^\S+#\s*$")?
///             .with_parent("exec")
///             .with_escalate("enable")
///             .with_deescalate("disable")
///             .with_auth(r"(?m)^Password:\s*$")?,
///     )
///     .with_default_privilege("privilege_exec");
///
/// let mut session = SessionBuilder::new("192.168.1.1")
///     .username("admin")
///     .password("secret")
///     .auth_secondary("enable-secret")
///     .platform(platform)
///     .build()?;
///
/// session.open().await?;
/// let response = session.send_command("show version", &SendOptions::default()).await?;
/// println!("{}", response.result);
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    host: String,
    port: u16,
    username: Option<String>,
    auth: AuthMethod,
    auth_secondary: Option<SecretString>,
    platform: Option<PlatformDefinition>,
    timeout_socket: Duration,
    channel: ChannelConfig,
    hop_retries: usize,
    host_keys: HostKeyPolicy,
    terminal_width: u32,
    terminal_height: u32,
}

impl SessionBuilder {
    /// Defaults: port 22, no authentication, 30s socket timeout.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: None,
            auth: AuthMethod::None,
            auth_secondary: None,
            platform: None,
            timeout_socket: Duration::from_secs(30),
            channel: ChannelConfig::default(),
            hop_retries: 1,
            host_keys: HostKeyPolicy::default(),
            terminal_width: 511,
            terminal_height: 24,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Required by [`build`](Self::build).
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password(SecretString::from(password.into()));
        self
    }

    /// Log in with an unencrypted OpenSSH key file.
    pub fn private_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: None,
        };
        self
    }

    pub fn private_key_with_passphrase(
        mut self,
        key_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: Some(SecretString::from(passphrase.into())),
        };
        self
    }

    /// Password for escalations that prompt for one, e.g. `enable`.
    pub fn auth_secondary(mut self, secret: impl Into<String>) -> Self {
        self.auth_secondary = Some(SecretString::from(secret.into()));
        self
    }

    /// Required by both build methods.
    pub fn platform(mut self, platform: PlatformDefinition) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Bound on connecting and logging in.
    pub fn timeout_socket(mut self, timeout: Duration) -> Self {
        self.timeout_socket = timeout;
        self
    }

    /// Default bound on every wait for device output.
    pub fn timeout_ops(mut self, timeout: Duration) -> Self {
        self.channel.timeout_ops = timeout;
        self
    }

    /// Extra attempts for a hop that leaves the device where it was (default 1).
    pub fn hop_retries(mut self, retries: usize) -> Self {
        self.hop_retries = retries;
        self
    }

    /// Whether the device echoes what is written (default true).
    pub fn echo(mut self, echo: bool) -> Self {
        self.channel.echo = echo;
        self
    }

    /// Line terminator written after every input (default `"\n"`).
    pub fn return_char(mut self, return_char: impl Into<String>) -> Self {
        self.channel.return_char = return_char.into();
        self
    }

    /// Trailing bytes searched for a prompt (default 1000).
    pub fn search_depth(mut self, depth: usize) -> Self {
        self.channel.search_depth = depth;
        self
    }

    /// Pause after a read that returned nothing (default 5ms).
    pub fn read_delay(mut self, delay: Duration) -> Self {
        self.channel.read_delay = delay;
        self
    }

    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_keys.mode = mode;
        self
    }

    /// Use a known_hosts file other than `~/.ssh/known_hosts`.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_keys.known_hosts = Some(path.into());
        self
    }

    /// PTY size in columns and rows (default 511x24).
    pub fn terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// An SSH session, not yet connected; see [`Session::open`].
    pub fn build(mut self) -> Result<Session<SshTransport>> {
        let username = self.username.take().ok_or_else(|| DriverError::InvalidConfig {
            message: "username is required".to_string(),
        })?;

        let ssh_config = SshConfig {
            host: self.host.clone(),
            port: self.port,
            username,
            auth: std::mem::replace(&mut self.auth, AuthMethod::None),
            timeout: self.timeout_socket,
            terminal_width: self.terminal_width,
            terminal_height: self.terminal_height,
            host_keys: std::mem::take(&mut self.host_keys),
        };

        self.build_with_transport(SshTransport::new(ssh_config))
    }

    /// A session over `transport`. Host, credential and socket settings
    /// are ignored since the transport already has its own.
    pub fn build_with_transport<T: Transport>(self, transport: T) -> Result<Session<T>> {
        let platform = self.platform.ok_or_else(|| DriverError::InvalidConfig {
            message: "platform must be specified".to_string(),
        })?;

        let mut session = Session::new(transport, platform, self.channel)?.with_hop_retries(self.hop_retries);
        if let Some(secret) = self.auth_secondary {
            session = session.with_auth_secondary(secret);
        }
        Ok(session)
    }
}
