//! Device session: command execution over a privilege-aware channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use secrecy::SecretString;

use super::graph::PrivilegeGraph;
use super::hooks::{DefaultHooks, SessionHooks};
use super::interactive::{InteractiveEvent, elicited_input};
use super::options::SendOptions;
use super::privilege::PrivilegeManager;
use super::response::Response;
use crate::channel::{Channel, ChannelConfig, Expectation};
use crate::error::{ChannelError, DriverError, PlatformError, Result};
use crate::platform::PlatformDefinition;
use crate::transport::Transport;

/// An interactive session with one device.
///
/// The session owns the [`Channel`] (and through it the transport), the
/// [`PrivilegeManager`] holding the current privilege level, and the
/// platform's default privilege and failure substrings. Every operation
/// takes `&mut self`, so one session is never driven concurrently.
///
/// Before each command the device is brought to the default privilege
/// level. Commands that change the level (such as `configure terminal`)
/// are tracked from the prompt they return, so the next command moves the
/// device back.
pub struct Session<T: Transport> {
    channel: Channel<T>,
    privilege: PrivilegeManager,
    default_privilege: String,
    failed_when_contains: Vec<String>,
    auth_secondary: Option<SecretString>,
    hooks: Arc<dyn SessionHooks<T>>,
}

impl<T: Transport> Session<T> {
    /// Create a session over `transport` for `platform`.
    ///
    /// Validates the privilege tree and the default privilege level before
    /// any I/O. The session uses [`DefaultHooks`] for the platform until
    /// replaced with [`with_hooks`](Self::with_hooks).
    pub fn new(transport: T, platform: PlatformDefinition, config: ChannelConfig) -> Result<Self> {
        let prompt_pattern = platform.prompt_pattern().map_err(ChannelError::InvalidPattern)?;

        let hooks = Arc::new(DefaultHooks::new(&platform));
        let PlatformDefinition {
            privilege_levels,
            default_privilege,
            failed_when_contains,
            ..
        } = platform;

        let graph = PrivilegeGraph::build(privilege_levels)?;
        let default_privilege = if default_privilege.is_empty() {
            graph.root().to_string()
        } else if graph.get(&default_privilege).is_some() {
            default_privilege
        } else {
            return Err(PlatformError::InvalidDefinition {
                message: format!("default privilege '{default_privilege}' is not a configured level"),
            }
            .into());
        };

        let privilege = PrivilegeManager::new(graph, &prompt_pattern, 1)?;

        Ok(Self {
            channel: Channel::new(transport, config, prompt_pattern),
            privilege,
            default_privilege,
            failed_when_contains,
            auth_secondary: None,
            hooks,
        })
    }

    /// Replace the open/close hooks.
    pub fn with_hooks(mut self, hooks: impl SessionHooks<T> + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Set the credential answered to privilege escalation prompts.
    pub fn with_auth_secondary(mut self, secret: SecretString) -> Self {
        self.auth_secondary = Some(secret);
        self
    }

    /// Set how many times an unconfirmed privilege hop is repeated.
    pub fn with_hop_retries(mut self, retries: usize) -> Self {
        self.privilege.set_hop_retries(retries);
        self
    }

    /// Get the channel.
    pub fn channel(&self) -> &Channel<T> {
        &self.channel
    }

    /// Get a mutable reference to the channel.
    pub fn channel_mut(&mut self) -> &mut Channel<T> {
        &mut self.channel
    }

    /// Get the privilege manager.
    pub fn privilege_manager(&self) -> &PrivilegeManager {
        &self.privilege
    }

    /// The level commands are sent from.
    pub fn default_privilege(&self) -> &str {
        &self.default_privilege
    }

    /// Name of the current privilege level, if known.
    pub fn current_privilege(&self) -> Option<&str> {
        self.privilege.current_name()
    }

    /// Default failure substrings.
    pub fn failed_when_contains(&self) -> &[String] {
        &self.failed_when_contains
    }

    /// Check if the transport is open.
    pub fn is_open(&self) -> bool {
        self.channel.transport().is_open()
    }

    /// Open the transport, wait out the login output and run the on-open hook.
    ///
    /// Everything up to the latest login prompt is consumed and that prompt
    /// sets the current privilege. If no prompt shows up, or the hook fails,
    /// the error is returned and the transport stays open.
    pub async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(DriverError::AlreadyOpen.into());
        }

        self.channel.transport_mut().open().await?;
        self.channel.clear_buffer();
        self.privilege.reset();
        debug!(
            "session: opened {}:{}",
            self.channel.transport().host(),
            self.channel.transport().port()
        );

        let timeout = self.channel.timeout_ops();
        let login = self.channel.read_through_prompts(timeout).await?;
        let prompt = self.channel.extract_prompt(&login);
        match self.privilege.observe_prompt(&prompt) {
            Some(level) => debug!("session: logged in at '{}'", level),
            None => debug!("session: login prompt {:?} matches no level", prompt),
        }

        let hooks = Arc::clone(&self.hooks);
        hooks.on_open(self).await
    }

    /// Run the on-close hook, then close the transport.
    ///
    /// A failing hook is logged; the transport is closed either way.
    pub async fn close(&mut self) -> Result<()> {
        if !self.is_open() {
            return Err(DriverError::NotOpen.into());
        }

        let hooks = Arc::clone(&self.hooks);
        if let Err(err) = hooks.on_close(self).await {
            warn!("session: on-close hook failed: {}", err);
        }

        self.privilege.reset();
        self.channel.clear_buffer();
        self.channel.transport_mut().close().await?;
        debug!("session: closed");
        Ok(())
    }

    /// Move the device to the named privilege level.
    pub async fn acquire_privilege(&mut self, name: &str) -> Result<()> {
        let timeout = self.channel.timeout_ops();
        self.acquire_with_timeout(name, timeout).await
    }

    /// Send a bare return and return the device prompt.
    pub async fn get_prompt(&mut self) -> Result<String> {
        self.ensure_open()?;
        let timeout = self.channel.timeout_ops();
        let prompt = self.channel.get_prompt(timeout).await?;
        self.privilege.observe_prompt(&prompt);
        Ok(prompt)
    }

    /// Write a line without waiting for any response.
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        self.ensure_open()?;
        let line = format!("{}{}", text, self.channel.config().return_char);
        self.channel.write(&line, false).await
    }

    /// Send a command from the default privilege level and wait for the prompt.
    ///
    /// A result containing a failure substring is returned as `Ok` with
    /// `failed` set. Errors (privilege acquisition, timeouts, transport)
    /// carry the partial response; see [`Error::response`](crate::Error::response).
    pub async fn send_command(&mut self, command: &str, options: &SendOptions) -> Result<Response> {
        let start = Instant::now();
        let timeout = self.timeout(options);
        let mut response = self.response(command);
        let mut raw = Vec::new();

        let echo_end = match self.exchange_command(command, timeout, &mut raw).await {
            Ok(echo_end) => echo_end,
            Err(err) => {
                response.raw_result = String::from_utf8_lossy(&raw).into_owned();
                return Err(err.with_response(response.fail(start.elapsed())));
            }
        };

        self.finish(&mut response, &raw, echo_end, options);
        response.elapsed = start.elapsed();
        debug!(
            "session: {:?} finished in {:?} (failed: {})",
            command, response.elapsed, response.failed
        );
        Ok(response)
    }

    /// Send several commands in order.
    ///
    /// The first error ends the batch. With
    /// [`stop_on_failed`](SendOptions::stop_on_failed) a failed response
    /// also ends it, after being included.
    pub async fn send_commands<I, S>(&mut self, commands: I, options: &SendOptions) -> Result<Vec<Response>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut responses = Vec::new();
        for command in commands {
            let response = self.send_command(command.as_ref(), options).await?;
            let failed = response.failed;
            responses.push(response);
            if failed && options.stop_on_failed {
                debug!("session: stopping batch after failed command");
                break;
            }
        }
        Ok(responses)
    }

    /// Run a scripted dialogue from the default privilege level.
    ///
    /// Each event's input is sent (without logging if hidden) and its
    /// expectation awaited, using the event's own timeout if it has one.
    /// Afterwards the session waits for a prompt unless the dialogue already
    /// ended on one. The response input is every event input joined with
    /// `", "`, hidden ones masked.
    pub async fn send_interactive(
        &mut self,
        events: &[InteractiveEvent],
        options: &SendOptions,
    ) -> Result<Response> {
        let start = Instant::now();
        let timeout = self.timeout(options);
        let mut response = self.response(elicited_input(events));
        let mut raw = Vec::new();

        if let Err(err) = self.exchange_interactive(events, timeout, &mut raw).await {
            response.raw_result = String::from_utf8_lossy(&raw).into_owned();
            return Err(err.with_response(response.fail(start.elapsed())));
        }

        self.finish(&mut response, &raw, 0, options);
        response.elapsed = start.elapsed();
        Ok(response)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DriverError::NotOpen.into())
        }
    }

    fn timeout(&self, options: &SendOptions) -> Duration {
        options.timeout_ops.unwrap_or(self.channel.timeout_ops())
    }

    fn response(&self, input: impl Into<String>) -> Response {
        let transport = self.channel.transport();
        Response::new(transport.host(), transport.port(), input)
    }

    async fn acquire_with_timeout(&mut self, name: &str, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        self.privilege
            .acquire(&mut self.channel, name, self.auth_secondary.as_ref(), timeout)
            .await
    }

    async fn ensure_default_privilege(&mut self, timeout: Duration) -> Result<()> {
        if self.privilege.current_name() == Some(self.default_privilege.as_str()) {
            return Ok(());
        }
        let default = self.default_privilege.clone();
        self.acquire_with_timeout(&default, timeout).await
    }

    /// Returns where the echo ends in `raw`; bytes that came in ahead of
    /// the echo end there too.
    async fn exchange_command(&mut self, command: &str, timeout: Duration, raw: &mut Vec<u8>) -> Result<usize> {
        self.ensure_default_privilege(timeout).await?;

        let echo = self.channel.send_input(command, false, timeout).await?;
        raw.extend_from_slice(&echo);
        let output = self.channel.read_until_prompt(timeout).await?;
        raw.extend_from_slice(&output);
        Ok(echo.len())
    }

    async fn exchange_interactive(
        &mut self,
        events: &[InteractiveEvent],
        timeout: Duration,
        raw: &mut Vec<u8>,
    ) -> Result<()> {
        self.ensure_default_privilege(timeout).await?;

        for event in events {
            let timeout = event.timeout.unwrap_or(timeout);
            debug!("session: interactive send {:?}", event.display_input());

            let echo = self.channel.send_input(&event.input, event.hidden, timeout).await?;
            raw.extend_from_slice(&echo);
            let output = self.channel.read_until(&event.expect, timeout).await?;
            raw.extend_from_slice(&output);
        }

        let at_prompt = matches!(events.last(), Some(event) if matches!(event.expect, Expectation::Prompt))
            || self
                .channel
                .prompt_range(raw)
                .is_some_and(|range| range.end == raw.len());
        if !at_prompt {
            let output = self.channel.read_until_prompt(timeout).await?;
            raw.extend_from_slice(&output);
        }
        Ok(())
    }

    /// Fill in result, prompt and failure state from the captured bytes.
    ///
    /// `skip` leading bytes (the consumed echo) are left out of the result.
    fn finish(&mut self, response: &mut Response, raw: &[u8], skip: usize, options: &SendOptions) {
        response.raw_result = String::from_utf8_lossy(raw).into_owned();

        let prompt_range = self.channel.prompt_range(raw).filter(|range| range.start >= skip);
        let end = match &prompt_range {
            Some(range) if options.strip_prompt => range.start,
            _ => raw.len(),
        };
        response.result = clean_output(&raw[skip..end]);
        response.prompt = prompt_range
            .map(|range| String::from_utf8_lossy(&raw[range]).trim().to_string())
            .unwrap_or_default();

        self.privilege.observe_prompt(&response.prompt);

        let substrings = options
            .failed_when_contains
            .as_deref()
            .unwrap_or(&self.failed_when_contains);
        response.classify(substrings);
    }
}

/// Normalize line endings and trim the newlines around the output.
fn clean_output(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output)
        .replace("\r\n", "\n")
        .replace('\r', "");
    text.trim_start_matches('\n').trim_end().to_string()
}
