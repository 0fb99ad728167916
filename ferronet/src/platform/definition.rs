//! The level set and defaults a session is built from.

use indexmap::IndexMap;
use regex::bytes::Regex;

use super::privilege_level::PrivilegeLevel;
use crate::channel::joined_prompt_pattern;

/// What the core needs to know about a kind of device.
///
/// Levels keep insertion order. Prompts are matched against them in that
/// order and the first level that matches (and is not excluded) wins, so add
/// a level with a broad pattern after the narrower levels it overlaps.
#[derive(Debug, Clone)]
pub struct PlatformDefinition {
    /// Identifies the platform in logs (e.g. "cisco_iosxe").
    pub name: String,

    /// All privilege levels, keyed by name.
    pub privilege_levels: IndexMap<String, PrivilegeLevel>,

    /// Level commands are sent from. Empty means the root level.
    pub default_privilege: String,

    /// Output substrings that mark a command as rejected.
    pub failed_when_contains: Vec<String>,

    /// Sent by [`DefaultHooks`](crate::driver::DefaultHooks) after the
    /// default privilege is acquired, e.g. to disable paging.
    pub on_open_commands: Vec<String>,

    /// Sent by [`DefaultHooks`](crate::driver::DefaultHooks) before closing.
    pub on_close_commands: Vec<String>,
}

impl PlatformDefinition {
    /// An empty platform.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            privilege_levels: IndexMap::new(),
            default_privilege: String::new(),
            failed_when_contains: Vec::new(),
            on_open_commands: Vec::new(),
            on_close_commands: Vec::new(),
        }
    }

    /// Add a level; a level with the same name is replaced in place.
    pub fn with_privilege(mut self, level: PrivilegeLevel) -> Self {
        self.privilege_levels.insert(level.name.clone(), level);
        self
    }

    pub fn with_default_privilege(mut self, name: impl Into<String>) -> Self {
        self.default_privilege = name.into();
        self
    }

    pub fn with_failure_pattern(mut self, substring: impl Into<String>) -> Self {
        self.failed_when_contains.push(substring.into());
        self
    }

    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    pub fn with_on_close_command(mut self, command: impl Into<String>) -> Self {
        self.on_close_commands.push(command.into());
        self
    }

    /// Look up a level by name.
    pub fn get_privilege(&self, name: &str) -> Option<&PrivilegeLevel> {
        self.privilege_levels.get(name)
    }

    /// Levels in matching order.
    pub fn levels(&self) -> impl Iterator<Item = &PrivilegeLevel> {
        self.privilege_levels.values()
    }

    /// One regex matching the prompt of any level.
    pub fn prompt_pattern(&self) -> Result<Regex, regex::Error> {
        joined_prompt_pattern(self.levels())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> PlatformDefinition {
        PlatformDefinition::new("lab")
            .with_privilege(PrivilegeLevel::new("exec", r"(?m)^\w+>$").unwrap())
            .with_privilege(
                PrivilegeLevel::new("privilege_exec", r"(?m)^\w+#$")
                    .unwrap()
                    .with_parent("exec")
                    .with_escalate("enable")
                    .with_deescalate("disable"),
            )
    }

    #[test]
    fn test_levels_keep_insertion_order() {
        let platform = platform();
        let names: Vec<&str> = platform.levels().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["exec", "privilege_exec"]);
    }

    #[test]
    fn test_replacing_a_level_keeps_its_position() {
        let platform = platform().with_privilege(PrivilegeLevel::new("exec", r"(?m)^\w+\$$").unwrap());
        let first = platform.levels().next().unwrap();
        assert_eq!(first.name, "exec");
        assert!(first.matches("host$"));
        assert_eq!(platform.privilege_levels.len(), 2);
    }

    #[test]
    fn test_prompt_pattern() {
        let pattern = platform().prompt_pattern().unwrap();
        assert!(pattern.is_match(b"output\nrouter>"));
        assert!(pattern.is_match(b"output\nrouter#"));
        assert!(!pattern.is_match(b"Password:"));
    }
}
