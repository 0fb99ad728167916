//! High-level driver for device interaction.
//!
//! The driver layer provides the main API for sending commands and managing
//! privilege levels on network devices: a [`Session`] built with
//! [`SessionBuilder`], navigating a [`PrivilegeGraph`] through a
//! [`PrivilegeManager`].

mod builder;
mod graph;
mod hooks;
mod interactive;
mod options;
mod privilege;
mod response;
mod session;

pub use builder::SessionBuilder;
pub use graph::{Hop, PrivilegeAction, PrivilegeGraph, PrivilegePath};
pub use hooks::{DefaultHooks, NoHooks, SessionHooks};
pub use interactive::{HIDDEN_INPUT, InteractiveBuilder, InteractiveEvent, PendingEvent};
pub use options::SendOptions;
pub use privilege::PrivilegeManager;
pub use response::Response;
pub use session::Session;
