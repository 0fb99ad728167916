//! Transport layer.
//!
//! The core only needs a byte pipe with an open/close lifecycle. The
//! [`Transport`] trait is that boundary; [`SshTransport`] implements it over
//! russh and [`StreamTransport`] over any tokio byte stream.

pub mod config;
mod ssh;
mod stream;

pub use config::{AuthMethod, HostKeyPolicy, HostKeyVerification, SshConfig};
pub use ssh::SshTransport;
pub use stream::StreamTransport;

use std::future::Future;

use crate::error::Result;

/// Byte-level connection to a device shell.
///
/// Implementations do no framing of their own. `read` may wait for data but
/// must be cancel safe: the channel drops the future when a deadline passes.
/// Returning an empty chunk means "nothing available yet".
pub trait Transport: Send {
    /// Establish the connection and start the shell.
    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Release the connection.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Write bytes to the shell verbatim.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Read the next available chunk of bytes.
    fn read(&mut self) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Whether the transport is currently open.
    fn is_open(&self) -> bool;

    /// Remote host, for responses and logging.
    fn host(&self) -> &str;

    /// Remote port, for responses and logging.
    fn port(&self) -> u16;
}
