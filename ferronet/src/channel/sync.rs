//! Timeout-bounded reads and writes against a device shell.
//!
//! [`Channel`] is the only component that touches the transport. It owns
//! a [`PatternBuffer`] that persists between reads: bytes that arrive after
//! a match stay buffered for the next read, because the stream carries no
//! framing and matching is purely positional.

use std::ops::Range;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, trace};
use regex::bytes::Regex;
use tokio::time::Instant;

use super::buffer::PatternBuffer;
use super::patterns::{Expectation, last_match_from};
use crate::error::{ChannelError, Result};
use crate::transport::Transport;

/// Configuration for channel behavior.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Default timeout for a single read operation.
    pub timeout_ops: Duration,

    /// Search depth for pattern matching.
    pub search_depth: usize,

    /// Appended to every input line.
    pub return_char: String,

    /// Whether the device echoes input back.
    pub echo: bool,

    /// Pause after a read that returned no bytes.
    pub read_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            timeout_ops: Duration::from_secs(30),
            search_depth: 1000,
            return_char: "\n".to_string(),
            echo: true,
            read_delay: Duration::from_millis(5),
        }
    }
}

/// Pattern-synchronized channel over a [`Transport`].
///
/// Not meant for concurrent use: every operation takes `&mut self`, so one
/// session's reads and writes are serialized by construction.
pub struct Channel<T> {
    transport: T,
    config: ChannelConfig,
    buffer: PatternBuffer,
    prompt_pattern: Regex,
}

impl<T: Transport> Channel<T> {
    /// Create a channel that treats `prompt_pattern` as "a prompt is ready".
    pub fn new(transport: T, config: ChannelConfig, prompt_pattern: Regex) -> Self {
        Self {
            buffer: PatternBuffer::new(config.search_depth),
            transport,
            config,
            prompt_pattern,
        }
    }

    /// Get a reference to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Get the configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// The joined prompt pattern.
    pub fn prompt_pattern(&self) -> &Regex {
        &self.prompt_pattern
    }

    /// Default timeout for read operations.
    pub fn timeout_ops(&self) -> Duration {
        self.config.timeout_ops
    }

    /// Set the default timeout for read operations.
    pub fn set_timeout_ops(&mut self, timeout: Duration) {
        self.config.timeout_ops = timeout;
    }

    /// Drop anything buffered but not yet consumed.
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    /// Write text verbatim. Redacted text is never logged.
    pub async fn write(&mut self, text: &str, redacted: bool) -> Result<()> {
        if redacted {
            debug!("channel: write <redacted>");
        } else {
            debug!("channel: write {:?}", text);
        }
        self.transport.write(text.as_bytes()).await
    }

    /// Write the return character.
    pub async fn send_return(&mut self) -> Result<()> {
        let return_char = self.config.return_char.clone();
        self.write(&return_char, false).await
    }

    /// Write `input` followed by the return character and consume its echo.
    ///
    /// Redacted input is assumed not to be echoed (password prompts), and
    /// nothing is consumed when the channel is configured without echo.
    /// Returns the consumed echo bytes.
    pub async fn send_input(&mut self, input: &str, redacted: bool, timeout: Duration) -> Result<Bytes> {
        let line = format!("{}{}", input, self.config.return_char);
        self.write(&line, redacted).await?;

        if redacted || !self.config.echo || input.is_empty() {
            return Ok(Bytes::new());
        }

        self.read_until(&Expectation::exact(input), timeout).await
    }

    /// Read until `pattern` matches the buffer tail.
    pub async fn read_until_pattern(&mut self, pattern: &Regex, timeout: Duration) -> Result<Bytes> {
        self.read_until(&Expectation::Regex(pattern.clone()), timeout)
            .await
    }

    /// Read until any configured prompt appears.
    pub async fn read_until_prompt(&mut self, timeout: Duration) -> Result<Bytes> {
        self.read_until(&Expectation::Prompt, timeout).await
    }

    /// Read until the expectation is met.
    ///
    /// Returns the buffered bytes up to the end of the match; anything after
    /// the match stays buffered. On timeout the accumulated bytes are
    /// discarded and [`ChannelError::PatternTimeout`] is returned.
    pub async fn read_until(&mut self, expectation: &Expectation, timeout: Duration) -> Result<Bytes> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(end) = expectation.find_end(&self.buffer, &self.prompt_pattern) {
                let data = self.buffer.split_to(end);
                trace!("channel: matched after {} bytes", data.len());
                return Ok(data);
            }

            if Instant::now() >= deadline {
                return Err(self.timed_out(timeout));
            }

            let chunk = match tokio::time::timeout_at(deadline, self.transport.read()).await {
                Ok(chunk) => chunk?,
                Err(_) => return Err(self.timed_out(timeout)),
            };

            if chunk.is_empty() {
                tokio::time::sleep_until(deadline.min(Instant::now() + self.config.read_delay)).await;
                continue;
            }

            trace!("channel: read {} bytes", chunk.len());
            self.buffer.extend(&chunk);
        }
    }

    fn timed_out(&mut self, timeout: Duration) -> crate::Error {
        debug!(
            "channel: no match within {:?}, discarding {} buffered bytes",
            timeout,
            self.buffer.len()
        );
        self.buffer.clear();
        ChannelError::PatternTimeout(timeout).into()
    }

    /// Read until a prompt, then through every later prompt already buffered.
    ///
    /// Used where the device may have sent more than one prompt, e.g. a
    /// login banner or several returns; the latest prompt ends the read.
    pub async fn read_through_prompts(&mut self, timeout: Duration) -> Result<Bytes> {
        let first = self.read_until_prompt(timeout).await?;
        let Some(later) = self.buffer.search_tail_last(&self.prompt_pattern) else {
            return Ok(first);
        };

        let mut data = BytesMut::from(&first[..]);
        data.extend_from_slice(&self.buffer.split_to(later.end));
        Ok(data.freeze())
    }

    /// Send a bare return and capture the prompt the device answers with.
    ///
    /// Output still buffered from earlier is dropped first, so an old prompt
    /// cannot stand in for the answer.
    pub async fn get_prompt(&mut self, timeout: Duration) -> Result<String> {
        if !self.buffer.is_empty() {
            debug!("channel: dropping {} stale bytes before prompt check", self.buffer.len());
            self.buffer.clear();
        }
        self.send_return().await?;
        let data = self.read_through_prompts(timeout).await?;
        Ok(self.extract_prompt(&data))
    }

    /// The last prompt-pattern match in `data`, trimmed.
    pub fn extract_prompt(&self, data: &[u8]) -> String {
        self.prompt_range(data)
            .map(|range| String::from_utf8_lossy(&data[range]).trim().to_string())
            .unwrap_or_default()
    }

    /// Byte range of the last prompt-pattern match within the search depth.
    pub fn prompt_range(&self, data: &[u8]) -> Option<Range<usize>> {
        self.last_match(&self.prompt_pattern, data)
    }

    /// Byte range of the last match of `pattern` within the search depth.
    pub fn last_match(&self, pattern: &Regex, data: &[u8]) -> Option<Range<usize>> {
        let start = data.len().saturating_sub(self.config.search_depth);
        last_match_from(pattern, data, start)
    }
}
