//! Transport over any tokio byte stream.
//!
//! Useful for console servers and lab setups that expose a device shell on
//! a plain TCP port, and for driving a session against an in-memory pipe.

use std::time::Duration;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::Transport;
use crate::error::{ChannelError, Result, TransportError};

const READ_CHUNK: usize = 8192;

/// [`Transport`] over an already connected `AsyncRead + AsyncWrite` stream.
///
/// `open` is a no-op beyond marking the transport usable; `close` shuts the
/// write half down.
pub struct StreamTransport<S> {
    host: String,
    port: u16,
    stream: S,
    open: bool,
    buf: Vec<u8>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a connected stream. `host` and `port` only label responses.
    pub fn new(host: impl Into<String>, port: u16, stream: S) -> Self {
        Self {
            host: host.into(),
            port,
            stream,
            open: false,
            buf: vec![0; READ_CHUNK],
        }
    }
}

impl StreamTransport<TcpStream> {
    /// Connect a TCP stream within `timeout`.
    pub async fn tcp(host: impl Into<String>, port: u16, timeout: Duration) -> Result<Self> {
        let host = host.into();
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(|source| TransportError::ConnectionFailed {
                host: host.clone(),
                port,
                source,
            })?;
        debug!("stream: connected to {}:{}", host, port);
        Ok(Self::new(host, port, stream))
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.stream.shutdown().await.map_err(TransportError::Io)?;
        }
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(TransportError::NotOpen.into());
        }
        self.stream.write_all(data).await.map_err(TransportError::Io)?;
        self.stream.flush().await.map_err(TransportError::Io)?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Vec<u8>> {
        if !self.open {
            return Err(TransportError::NotOpen.into());
        }
        let n = self.stream.read(&mut self.buf).await.map_err(TransportError::Io)?;
        if n == 0 {
            return Err(ChannelError::Closed.into());
        }
        Ok(self.buf[..n].to_vec())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }
}
