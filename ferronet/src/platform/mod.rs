//! Platform definitions.
//!
//! A platform describes a device's privilege levels, the privilege level
//! commands are sent from, and the substrings that mark a command as failed.
//! Platforms are supplied by the caller, either in code or through the
//! serde-deserializable [`PlatformConfig`].

mod config;
mod definition;
mod privilege_level;

pub use config::{PlatformConfig, PrivilegeLevelConfig};
pub use definition::PlatformDefinition;
pub use privilege_level::PrivilegeLevel;
