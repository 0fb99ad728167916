//! SSH transport over russh: one PTY shell channel per connection.

use std::sync::{Arc, Mutex};

use log::{debug, trace};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg, Disconnect};
use secrecy::ExposeSecret;

use super::Transport;
use super::config::{AuthMethod, HostKeyPolicy, SshConfig};
use crate::error::{ChannelError, Result, TransportError};

/// An open connection: the client handle and the shell channel on it.
struct Connection {
    handle: Handle<HostKeyCheck>,
    shell: Channel<Msg>,
}

/// SSH [`Transport`]. Nothing is dialed until [`Transport::open`].
pub struct SshTransport {
    config: SshConfig,
    connection: Option<Connection>,
}

impl SshTransport {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    /// Get the connection configuration.
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    fn shell(&mut self) -> Result<&mut Channel<Msg>> {
        self.connection
            .as_mut()
            .map(|c| &mut c.shell)
            .ok_or_else(|| TransportError::NotOpen.into())
    }
}

/// Dial, verify the host key and authenticate.
async fn dial(config: &SshConfig) -> Result<Handle<HostKeyCheck>> {
    let client_config = Arc::new(client::Config {
        inactivity_timeout: Some(config.timeout),
        ..Default::default()
    });

    let rejection = Arc::new(Mutex::new(None));
    let check = HostKeyCheck {
        host: config.host.clone(),
        port: config.port,
        policy: config.host_keys.clone(),
        rejection: Arc::clone(&rejection),
    };

    let connect = client::connect(client_config, (config.host.as_str(), config.port), check);
    let mut handle = match tokio::time::timeout(config.timeout, connect).await {
        Err(_) => return Err(TransportError::Timeout(config.timeout).into()),
        // a host key rejection surfaces from russh as a generic error
        Ok(Err(e)) => {
            let rejected = rejection.lock().ok().and_then(|mut slot| slot.take());
            return Err(rejected.unwrap_or(TransportError::Ssh(e)).into());
        }
        Ok(Ok(handle)) => handle,
    };

    if !login(&mut handle, config).await? {
        return Err(TransportError::AuthenticationFailed {
            user: config.username.clone(),
        }
        .into());
    }

    Ok(handle)
}

async fn login(handle: &mut Handle<HostKeyCheck>, config: &SshConfig) -> Result<bool> {
    let user = config.username.as_str();
    let outcome = match &config.auth {
        AuthMethod::None => handle.authenticate_none(user).await,
        AuthMethod::Password(password) => handle.authenticate_password(user, password.expose_secret()).await,
        AuthMethod::PrivateKey { path, passphrase } => {
            let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                .map_err(|e| TransportError::Key(e.to_string()))?;
            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .map_err(TransportError::Ssh)?
                .flatten();
            handle
                .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
                .await
        }
    };
    Ok(outcome.map_err(TransportError::Ssh)?.success())
}

/// Request a PTY and a shell on a fresh session channel.
async fn start_shell(handle: &Handle<HostKeyCheck>, config: &SshConfig) -> std::result::Result<Channel<Msg>, russh::Error> {
    let shell = handle.channel_open_session().await?;
    shell
        .request_pty(true, "xterm", config.terminal_width, config.terminal_height, 0, 0, &[])
        .await?;
    shell.request_shell(true).await?;
    Ok(shell)
}

impl Transport for SshTransport {
    async fn open(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        debug!("ssh: connecting to {} as {}", self.config.socket_addr(), self.config.username);
        let handle = dial(&self.config).await?;
        let shell = start_shell(&handle, &self.config)
            .await
            .map_err(TransportError::Ssh)?;
        self.connection = Some(Connection { handle, shell });
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let Some(Connection { handle, shell }) = self.connection.take() else {
            return Ok(());
        };

        if let Err(e) = shell.eof().await {
            trace!("ssh: eof on close failed: {}", e);
        }
        handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.shell()?.data(data).await.map_err(TransportError::Ssh)?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Vec<u8>> {
        match self.shell()?.wait().await {
            Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => Ok(data.to_vec()),
            Some(ChannelMsg::Eof | ChannelMsg::Close) | None => Err(ChannelError::Closed.into()),
            Some(other) => {
                trace!("ssh: ignoring {:?}", other);
                Ok(Vec::new())
            }
        }
    }

    fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    fn host(&self) -> &str {
        &self.config.host
    }

    fn port(&self) -> u16 {
        self.config.port
    }
}

/// russh client handler applying a [`HostKeyPolicy`].
struct HostKeyCheck {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    /// Why the key was refused, kept for `dial` to report.
    rejection: Arc<Mutex<Option<TransportError>>>,
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(&mut self, key: &PublicKey) -> std::result::Result<bool, Self::Error> {
        match self.policy.verify(&self.host, self.port, key) {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!("ssh: rejecting host key: {}", e);
                if let Ok(mut slot) = self.rejection.lock() {
                    *slot = Some(e);
                }
                Ok(false)
            }
        }
    }
}
