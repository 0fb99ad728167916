//! Errors, one enum per layer.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::driver::Response;

/// Any failure surfaced by ferronet, tagged by the layer it came from.
#[derive(Error, Debug)]
pub enum Error {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("channel: {0}")]
    Channel(#[from] ChannelError),

    #[error("session: {0}")]
    Driver(#[from] DriverError),

    #[error("platform: {0}")]
    Platform(#[from] PlatformError),

    /// An operation failed part way; `response` holds what was captured.
    #[error("{source}")]
    Operation {
        response: Box<Response>,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap an error together with the partial response of the operation.
    pub(crate) fn with_response(self, response: Response) -> Self {
        Error::Operation {
            response: Box::new(response),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through [`Error::Operation`].
    pub fn root(&self) -> &Error {
        match self {
            Error::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// The partial response attached to a failed operation, if any.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Error::Operation { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Whether this error is a read timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.root(),
            Error::Channel(ChannelError::PatternTimeout(_))
                | Error::Transport(TransportError::Timeout(_))
        )
    }
}

/// Connecting, logging in and moving bytes.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("cannot connect to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("ssh: {0}")]
    Ssh(#[from] russh::Error),

    #[error("server rejected credentials for '{user}'")]
    AuthenticationFailed { user: String },

    /// The private key could not be loaded or decrypted.
    #[error("private key: {0}")]
    Key(String),

    #[error("host key for {host}:{port} does not match known_hosts line {line}")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Strict checking and no known_hosts entry.
    #[error("{host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    #[error("known_hosts: {0}")]
    KnownHosts(String),

    #[error("transport used before open()")]
    NotOpen,

    /// Connecting took longer than the socket timeout.
    #[error("no connection after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Reading and writing the shell stream.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Nothing expected showed up before the deadline.
    #[error("expected output not seen within {0:?}")]
    PatternTimeout(Duration),

    /// The device closed the stream.
    #[error("stream closed by device")]
    Closed,

    #[error("bad pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Using a session and moving between privilege levels.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("session is not open")]
    NotOpen,

    #[error("session is already open")]
    AlreadyOpen,

    /// The name is not a level of the platform. Raised before any I/O.
    #[error("no privilege level named '{name}'")]
    InvalidDesiredPrivilege { name: String },

    /// No level matches `prompt`, or a hop did not land where it should.
    #[error("prompt '{prompt}' does not identify a privilege level")]
    CouldNotDeterminePrivilege { prompt: String },

    #[error("{message}")]
    InvalidConfig { message: String },
}

/// A platform that cannot be used as given.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("{message}")]
    InvalidDefinition { message: String },

    #[error("privilege level '{level}' has unknown parent '{parent}'")]
    DanglingParent { level: String, parent: String },

    #[error("more than one root privilege level: {roots:?}")]
    AmbiguousRoot { roots: Vec<String> },

    #[error("every privilege level has a parent")]
    MissingRoot,

    #[error("privilege level '{level}' is missing its {command} command")]
    MissingTransition { level: String, command: &'static str },

    #[error("{field}: {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
