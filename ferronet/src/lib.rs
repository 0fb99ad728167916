//! # Ferronet
//!
//! Async client for the command-line shells of network devices.
//!
//! Ferronet drives an interactive session (SSH, or any byte stream such as a
//! console server) with no framing of its own: every exchange is
//! synchronized by matching the device prompt at the tail of the output.
//!
//! ## Features
//!
//! - Privilege levels as a tree, navigated hop by hop with each hop verified
//!   against the prompt it produces
//! - Commands and scripted interactive dialogues with failure-substring
//!   classification
//! - Timeout-bounded reads; failed operations keep their partial response
//! - Async SSH via russh, or any tokio `AsyncRead + AsyncWrite`
//! - Platforms defined in code or deserialized with serde
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferronet::{PlatformConfig, SendOptions, SessionBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let platform: PlatformConfig = serde_json::from_str(&std::fs::read_to_string("ios.json")?)?;
//!
//!     let mut session = SessionBuilder::new("192.168.1.1")
//!         .username("admin")
//!         .password("secret")
//!         .auth_secondary("enable-secret")
//!         .platform(platform.into_definition()?)
//!         .build()?;
//!
//!     session.open().await?;
//!
//!     let response = session.send_command("show version", &SendOptions::default()).await?;
//!     println!("{}", response.result);
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod driver;
pub mod error;
pub mod platform;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use driver::{
    InteractiveBuilder, InteractiveEvent, Response, SendOptions, Session, SessionBuilder, SessionHooks,
};
pub use error::{Error, Result};
pub use platform::{PlatformConfig, PlatformDefinition, PrivilegeLevel};
pub use transport::{AuthMethod, SshConfig, SshTransport, StreamTransport, Transport};
