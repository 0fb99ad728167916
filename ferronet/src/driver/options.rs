//! Per-call overrides for command execution.

use std::time::Duration;

/// Options for [`Session::send_command`](super::Session::send_command) and
/// [`Session::send_interactive`](super::Session::send_interactive).
///
/// Unset fields fall back to the session defaults.
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// Replace the session's failure substrings for this call.
    pub failed_when_contains: Option<Vec<String>>,

    /// Replace the session's read timeout for this call.
    pub timeout_ops: Option<Duration>,

    /// Remove the trailing prompt from the result.
    pub strip_prompt: bool,

    /// For multiple commands: stop after the first failed response.
    pub stop_on_failed: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            failed_when_contains: None,
            timeout_ops: None,
            strip_prompt: true,
            stop_on_failed: false,
        }
    }
}

impl SendOptions {
    /// Session defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the failure substrings.
    pub fn failed_when_contains<I, S>(mut self, substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failed_when_contains = Some(substrings.into_iter().map(Into::into).collect());
        self
    }

    /// Override the read timeout.
    pub fn timeout_ops(mut self, timeout: Duration) -> Self {
        self.timeout_ops = Some(timeout);
        self
    }

    /// Keep or strip the trailing prompt.
    pub fn strip_prompt(mut self, strip: bool) -> Self {
        self.strip_prompt = strip;
        self
    }

    /// Stop a command batch at the first failure.
    pub fn stop_on_failed(mut self, stop: bool) -> Self {
        self.stop_on_failed = stop;
        self
    }
}
