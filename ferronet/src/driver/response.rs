//! Response type for command execution results.

use std::time::Duration;

/// Response from a command or interactive dialogue.
///
/// Returned on success, and attached to the error (see
/// [`Error::response`](crate::Error::response)) when the operation failed
/// part-way, with whatever was captured up to that point.
#[derive(Debug, Clone)]
pub struct Response {
    /// Host the input was sent to.
    pub host: String,

    /// Port the input was sent to.
    pub port: u16,

    /// What was sent (interactive inputs joined with `", "`).
    pub input: String,

    /// The raw output, including echo and trailing prompt.
    pub raw_result: String,

    /// The output with echo, line endings and (optionally) prompt cleaned up.
    pub result: String,

    /// The prompt that was matched at the end.
    pub prompt: String,

    /// Time taken to execute.
    pub elapsed: Duration,

    /// Whether the operation failed.
    pub failed: bool,

    /// The failure substring found in the result, if any.
    pub failed_when_contains: Option<String>,
}

impl Response {
    /// Create an empty response for `input` sent to `host:port`.
    pub fn new(host: impl Into<String>, port: u16, input: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            input: input.into(),
            raw_result: String::new(),
            result: String::new(),
            prompt: String::new(),
            elapsed: Duration::ZERO,
            failed: false,
            failed_when_contains: None,
        }
    }

    /// Mark the response failed, keeping what was captured.
    pub(crate) fn fail(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self.failed = true;
        self
    }

    /// Mark the response failed if the result contains any of `substrings`.
    ///
    /// The first substring found, in list order, is recorded.
    pub(crate) fn classify(&mut self, substrings: &[String]) {
        self.failed_when_contains = substrings
            .iter()
            .find(|s| !s.is_empty() && self.result.contains(s.as_str()))
            .cloned();
        self.failed = self.failed_when_contains.is_some();
    }

    /// Check if the response indicates success.
    pub fn is_success(&self) -> bool {
        !self.failed
    }

    /// Get the result lines as an iterator.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.result.lines()
    }

    /// Check if the result contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.result.contains(pattern)
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.result)
    }
}
