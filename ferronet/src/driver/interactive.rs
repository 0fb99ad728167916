//! Scripted dialogues for commands that stop and ask something.
//!
//! A dialogue is a list of [`InteractiveEvent`]s. Each one writes a line and
//! then waits for a regex, a literal string or the device prompt before the
//! next line goes out, e.g. `reload` followed by `y` once `[confirm]` shows.

use std::time::Duration;

use crate::channel::Expectation;

/// Stand-in for hidden inputs wherever sent text is reported.
pub const HIDDEN_INPUT: &str = "********";

/// One write-then-wait step of a dialogue.
///
/// ```rust
/// use ferronet::driver::InteractiveEvent;
///
/// let reload = [
///     InteractiveEvent::exact("reload", "[confirm]"),
///     InteractiveEvent::prompt("y"),
/// ];
/// assert_eq!(reload[0].display_input(), "reload");
/// ```
#[derive(Debug, Clone)]
pub struct InteractiveEvent {
    /// Line to write; the return character is appended on send.
    pub input: String,

    pub expect: Expectation,

    /// Masked in logs and in [`Response::input`](super::Response::input).
    pub hidden: bool,

    /// Replaces the session's read timeout while waiting for `expect`.
    pub timeout: Option<Duration>,
}

impl InteractiveEvent {
    /// Wait for `pattern` (a regex) after writing `input`.
    pub fn new(input: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Expectation::regex(pattern).map(|expect| Self::with_expectation(input, expect))
    }

    /// Wait for the literal `text`.
    pub fn exact(input: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_expectation(input, Expectation::exact(text))
    }

    /// Wait for the prompt of any privilege level.
    pub fn prompt(input: impl Into<String>) -> Self {
        Self::with_expectation(input, Expectation::Prompt)
    }

    pub fn with_expectation(input: impl Into<String>, expect: Expectation) -> Self {
        Self {
            input: input.into(),
            expect,
            hidden: false,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// `input`, or [`HIDDEN_INPUT`] when hidden.
    pub fn display_input(&self) -> &str {
        match self.hidden {
            true => HIDDEN_INPUT,
            false => &self.input,
        }
    }
}

/// What a dialogue sent, comma separated, hidden inputs masked.
pub(crate) fn elicited_input(events: &[InteractiveEvent]) -> String {
    let shown: Vec<&str> = events.iter().map(InteractiveEvent::display_input).collect();
    shown.join(", ")
}

/// Assembles a dialogue, alternating `send*` and `expect*` calls.
///
/// ```rust
/// use std::time::Duration;
/// use ferronet::driver::InteractiveBuilder;
///
/// let save = InteractiveBuilder::new()
///     .with_timeout(Duration::from_secs(60))
///     .send("copy running-config startup-config")
///     .expect(r"Destination filename \[\S+\]\?")
///     .send("")
///     .expect_prompt()
///     .build()?;
/// assert_eq!(save[1].timeout, Some(Duration::from_secs(60)));
/// # Ok::<(), regex::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct InteractiveBuilder {
    events: Vec<InteractiveEvent>,
    fallback_timeout: Option<Duration>,
    /// First bad regex seen; reported by `build`.
    error: Option<regex::Error>,
}

impl InteractiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the next event.
    pub fn send(self, input: impl Into<String>) -> PendingEvent {
        PendingEvent {
            builder: self,
            input: input.into(),
            hidden: false,
            timeout: None,
        }
    }

    /// Start the next event with a masked input, e.g. a password.
    pub fn send_hidden(self, input: impl Into<String>) -> PendingEvent {
        let mut pending = self.send(input);
        pending.hidden = true;
        pending
    }

    /// Timeout for events that do not set their own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Vec<InteractiveEvent>, regex::Error> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let mut events = self.events;
        for event in events.iter_mut().filter(|e| e.timeout.is_none()) {
            event.timeout = self.fallback_timeout;
        }
        Ok(events)
    }
}

/// An event whose input is known but whose expectation is not yet.
#[derive(Debug)]
pub struct PendingEvent {
    builder: InteractiveBuilder,
    input: String,
    hidden: bool,
    timeout: Option<Duration>,
}

impl PendingEvent {
    pub fn expect(self, pattern: &str) -> InteractiveBuilder {
        match Expectation::regex(pattern) {
            Ok(expect) => self.finish(expect),
            Err(err) => {
                let mut builder = self.builder;
                builder.error.get_or_insert(err);
                builder
            }
        }
    }

    pub fn expect_exact(self, text: impl Into<String>) -> InteractiveBuilder {
        self.finish(Expectation::exact(text))
    }

    pub fn expect_prompt(self) -> InteractiveBuilder {
        self.finish(Expectation::Prompt)
    }

    /// Timeout for this event only.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn finish(self, expect: Expectation) -> InteractiveBuilder {
        let PendingEvent {
            mut builder,
            input,
            hidden,
            timeout,
        } = self;
        builder.events.push(InteractiveEvent {
            input,
            expect,
            hidden,
            timeout,
        });
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_constructors() {
        let confirm = InteractiveEvent::new("reload", r"\[confirm\]").unwrap();
        assert!(matches!(confirm.expect, Expectation::Regex(_)));
        assert!(!confirm.hidden);
        assert_eq!(confirm.timeout, None);

        assert!(InteractiveEvent::new("reload", r"[confirm").is_err());
        assert!(matches!(InteractiveEvent::prompt("y").expect, Expectation::Prompt));
    }

    #[test]
    fn test_hidden_input_is_masked() {
        let secret = InteractiveEvent::prompt("hunter2").with_hidden(true);
        assert_eq!(secret.input, "hunter2");
        assert_eq!(secret.display_input(), HIDDEN_INPUT);
    }

    #[test]
    fn test_builder_alternates_send_and_expect() {
        let dialogue = InteractiveBuilder::new()
            .send("delete flash:old.bin")
            .expect_exact("[confirm]")
            .send("y")
            .expect(r"#\s*$")
            .build()
            .unwrap();

        let inputs: Vec<&str> = dialogue.iter().map(|e| e.input.as_str()).collect();
        assert_eq!(inputs, ["delete flash:old.bin", "y"]);
        assert!(matches!(dialogue[0].expect, Expectation::Exact(ref t) if t == "[confirm]"));
    }

    #[test]
    fn test_elicited_input_masks_hidden() {
        let dialogue = InteractiveBuilder::new()
            .send("username admin secret")
            .expect(r"Enter secret:")
            .send_hidden("hunter2")
            .expect_prompt()
            .build()
            .unwrap();

        assert!(dialogue[1].hidden);
        assert_eq!(elicited_input(&dialogue), "username admin secret, ********");
    }

    #[test]
    fn test_event_timeout_beats_fallback() {
        let dialogue = InteractiveBuilder::new()
            .with_timeout(Duration::from_secs(60))
            .send("copy run start")
            .with_timeout(Duration::from_secs(5))
            .expect(r"\?")
            .send("")
            .expect_prompt()
            .build()
            .unwrap();

        assert_eq!(dialogue[0].timeout, Some(Duration::from_secs(5)));
        assert_eq!(dialogue[1].timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_bad_pattern_fails_build() {
        let result = InteractiveBuilder::new()
            .send("reload")
            .expect(r"(unclosed")
            .send("y")
            .expect_prompt()
            .build();
        assert!(result.is_err());
    }
}
