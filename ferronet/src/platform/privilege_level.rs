//! A named device mode and how to get in and out of it.

use regex::bytes::Regex;

use crate::error::PlatformError;

/// One node of a platform's privilege tree.
///
/// Every level but the root names its parent in `previous_priv` and carries
/// the two commands that connect it to that parent: `escalate_command` is
/// sent from the parent to enter, `deescalate_command` is sent here to leave.
///
/// ```rust
/// use ferronet::platform::PrivilegeLevel;
///
/// let config = PrivilegeLevel::new("configuration", r"(?m)^\S+\(conf[a-z0-9.\-@/:+]{0,32}\)#\s*$")?
///     .with_parent("privilege_exec")
///     .with_escalate("configure terminal")
///     .with_deescalate("end");
/// assert!(config.matches("router(config-if)#"));
/// # Ok::<(), ferronet::error::PlatformError>(())
/// ```
#[derive(Debug, Clone)]
pub struct PrivilegeLevel {
    pub name: String,

    /// Matches this level's prompt.
    pub pattern: Regex,

    /// Parent level; `None` only for the root.
    pub previous_priv: Option<String>,

    pub escalate_command: Option<String>,

    pub deescalate_command: Option<String>,

    /// Entering may stop at a password prompt.
    pub escalate_auth: bool,

    /// The password prompt; set together with `escalate_auth`.
    pub escalate_prompt: Option<Regex>,

    /// A prompt containing any of these never matches this level, e.g.
    /// `"(config"` keeps `router(config)#` out of privilege exec.
    pub not_contains: Vec<String>,
}

impl PrivilegeLevel {
    /// A root level with no transitions.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, PlatformError> {
        let name = name.into();
        Ok(Self {
            pattern: compile(&name, pattern)?,
            name,
            previous_priv: None,
            escalate_command: None,
            deescalate_command: None,
            escalate_auth: false,
            escalate_prompt: None,
            not_contains: Vec::new(),
        })
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.previous_priv = Some(parent.into());
        self
    }

    pub fn with_escalate(mut self, command: impl Into<String>) -> Self {
        self.escalate_command = Some(command.into());
        self
    }

    pub fn with_deescalate(mut self, command: impl Into<String>) -> Self {
        self.deescalate_command = Some(command.into());
        self
    }

    /// Require a password on entry, recognized by `prompt_pattern`.
    pub fn with_auth(mut self, prompt_pattern: &str) -> Result<Self, PlatformError> {
        let field = format!("{}.escalate_prompt", self.name);
        self.escalate_prompt = Some(compile(&field, prompt_pattern)?);
        self.escalate_auth = true;
        Ok(self)
    }

    pub fn with_not_contains(mut self, text: impl Into<String>) -> Self {
        self.not_contains.push(text.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.previous_priv.is_none()
    }

    /// The password prompt, if entering this level asks for one.
    pub fn auth_prompt(&self) -> Option<&Regex> {
        self.escalate_prompt.as_ref().filter(|_| self.escalate_auth)
    }

    /// Whether `prompt` belongs to this level.
    pub fn matches(&self, prompt: &str) -> bool {
        let excluded = self.not_contains.iter().any(|text| prompt.contains(text.as_str()));
        !excluded && self.pattern.is_match(prompt.as_bytes())
    }
}

fn compile(field: &str, pattern: &str) -> Result<Regex, PlatformError> {
    Regex::new(pattern).map_err(|source| PlatformError::InvalidPattern {
        field: field.to_string(),
        source,
    })
}
