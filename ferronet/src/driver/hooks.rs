//! Setup and teardown strategies run around the transport lifecycle.

use futures_util::future::BoxFuture;
use log::{debug, warn};

use super::options::SendOptions;
use super::session::Session;
use crate::error::Result;
use crate::platform::PlatformDefinition;
use crate::transport::Transport;

/// Callbacks a [`Session`] invokes when it opens and closes.
///
/// `on_open` runs after the transport is open; if it fails, `open` fails and
/// the transport is left open. `on_close` runs before the transport is
/// closed; its failure is logged and the transport is closed regardless.
///
/// Methods return boxed futures so sessions can hold hooks as trait objects.
pub trait SessionHooks<T: Transport>: Send + Sync {
    /// Prepare a freshly opened session.
    fn on_open<'a>(&'a self, session: &'a mut Session<T>) -> BoxFuture<'a, Result<()>>;

    /// Tidy up a session about to be closed.
    fn on_close<'a>(&'a self, session: &'a mut Session<T>) -> BoxFuture<'a, Result<()>>;
}

/// Acquire the default privilege and send the platform's setup commands.
///
/// On close, the platform's teardown commands are sent.
#[derive(Debug, Clone, Default)]
pub struct DefaultHooks {
    on_open_commands: Vec<String>,
    on_close_commands: Vec<String>,
}

impl DefaultHooks {
    /// Hooks sending the on-open/on-close commands of `platform`.
    pub fn new(platform: &PlatformDefinition) -> Self {
        Self {
            on_open_commands: platform.on_open_commands.clone(),
            on_close_commands: platform.on_close_commands.clone(),
        }
    }
}

impl<T: Transport> SessionHooks<T> for DefaultHooks {
    fn on_open<'a>(&'a self, session: &'a mut Session<T>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let default = session.default_privilege().to_string();
            session.acquire_privilege(&default).await?;

            for command in &self.on_open_commands {
                let response = session.send_command(command, &SendOptions::default()).await?;
                if response.failed {
                    warn!("session: on-open command {:?} was rejected: {}", command, response.result);
                }
            }
            debug!("session: on-open complete");
            Ok(())
        })
    }

    fn on_close<'a>(&'a self, session: &'a mut Session<T>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for command in &self.on_close_commands {
                // the device usually drops the connection here, so no prompt is awaited
                session.write_line(command).await?;
            }
            Ok(())
        })
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl<T: Transport> SessionHooks<T> for NoHooks {
    fn on_open<'a>(&'a self, _session: &'a mut Session<T>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn on_close<'a>(&'a self, _session: &'a mut Session<T>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}
