//! Serializable platform configuration.
//!
//! [`PlatformConfig`] is the string-typed form of a [`PlatformDefinition`],
//! suitable for loading from JSON, YAML or TOML with any serde format crate.
//! Patterns are compiled by [`PlatformConfig::into_definition`].
//!
//! ```rust
//! use ferronet::platform::PlatformConfig;
//!
//! let config = PlatformConfig {
//!     name: "lab".into(),
//!     default_desired_privilege: "exec".into(),
//!     privilege_levels: vec![ferronet::platform::PrivilegeLevelConfig {
//!         name: "exec".into(),
//!         pattern: r">\s*$".into(),
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! };
//! let platform = config.into_definition().unwrap();
//! assert_eq!(platform.default_privilege, "exec");
//! ```

use serde::Deserialize;

use super::definition::PlatformDefinition;
use super::privilege_level::PrivilegeLevel;
use crate::error::PlatformError;

/// Raw privilege level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrivilegeLevelConfig {
    pub name: String,
    pub pattern: String,
    pub previous_priv: String,
    pub deescalate: String,
    pub escalate: String,
    pub escalate_auth: bool,
    pub escalate_prompt: String,
    pub not_contains: Vec<String>,
}

/// Raw platform configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformConfig {
    pub name: String,
    pub default_desired_privilege: String,
    /// Levels in evaluation order.
    pub privilege_levels: Vec<PrivilegeLevelConfig>,
    pub failed_when_contains: Vec<String>,
    pub on_open_commands: Vec<String>,
    pub on_close_commands: Vec<String>,
}

impl PrivilegeLevelConfig {
    fn compile(self) -> Result<PrivilegeLevel, PlatformError> {
        let mut level = PrivilegeLevel::new(self.name, &self.pattern)?;

        if !self.previous_priv.is_empty() {
            level = level.with_parent(self.previous_priv);
        }
        if !self.escalate.is_empty() {
            level = level.with_escalate(self.escalate);
        }
        if !self.deescalate.is_empty() {
            level = level.with_deescalate(self.deescalate);
        }
        if self.escalate_auth {
            if self.escalate_prompt.is_empty() {
                return Err(PlatformError::InvalidDefinition {
                    message: format!(
                        "privilege level '{}' requires escalate auth but has no escalate_prompt",
                        level.name
                    ),
                });
            }
            level = level.with_auth(&self.escalate_prompt)?;
        }
        for text in self.not_contains {
            level = level.with_not_contains(text);
        }

        Ok(level)
    }
}

impl PlatformConfig {
    /// Compile patterns and produce a [`PlatformDefinition`].
    ///
    /// Graph shape is validated later, when a session is built.
    pub fn into_definition(self) -> Result<PlatformDefinition, PlatformError> {
        let mut platform =
            PlatformDefinition::new(self.name).with_default_privilege(self.default_desired_privilege);

        for raw in self.privilege_levels {
            if raw.name.is_empty() {
                return Err(PlatformError::InvalidDefinition {
                    message: "privilege level with empty name".to_string(),
                });
            }
            if platform.privilege_levels.contains_key(&raw.name) {
                return Err(PlatformError::InvalidDefinition {
                    message: format!("duplicate privilege level '{}'", raw.name),
                });
            }
            platform = platform.with_privilege(raw.compile()?);
        }

        platform.failed_when_contains = self.failed_when_contains;
        platform.on_open_commands = self.on_open_commands;
        platform.on_close_commands = self.on_close_commands;

        Ok(platform)
    }
}
