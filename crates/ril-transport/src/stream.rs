//! Generic byte-stream transport.
//!
//! Every modem link this crate supports ends up as something implementing
//! [`AsyncRead`] + [`AsyncWrite`]: a serial stream, a TCP stream, a Unix
//! stream, or a plain character device file. [`StreamTransport`] adapts any
//! of those to the [`Transport`] trait with uniform logging and error
//! mapping.

use async_trait::async_trait;
use ril_core::error::{Error, Result};
use ril_core::transport::Transport;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// [`Transport`] over any async byte stream.
#[derive(Debug)]
pub struct StreamTransport<S> {
    /// The underlying stream, `None` after `close()`.
    stream: Option<S>,
    /// Human-readable endpoint for logging.
    label: String,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    /// Wrap an already-connected stream.
    pub fn new(stream: S, label: impl Into<String>) -> Self {
        Self {
            stream: Some(stream),
            label: label.into(),
        }
    }

    /// The endpoint label (device path, address, socket path).
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Map an I/O error to the RIL error type, singling out a dead peer.
pub(crate) fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(endpoint = %self.label, bytes = data.len(), "Sending data");

        stream.write_all(data).await.map_err(|e| {
            tracing::error!(endpoint = %self.label, error = %e, "Failed to send data");
            map_io_error(e)
        })?;
        stream.flush().await.map_err(map_io_error)?;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Ok(Ok(n)) => {
                tracing::trace!(endpoint = %self.label, bytes = n, "Received data");
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(endpoint = %self.label, error = %e, "Failed to receive data");
                Err(map_io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!(endpoint = %self.label, "Closing transport");
            if let Err(e) = stream.shutdown().await {
                tracing::debug!(
                    endpoint = %self.label,
                    error = %e,
                    "Shutdown failed (continuing anyway)"
                );
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_receive_over_duplex() {
        let (a, mut b) = tokio::io::duplex(64);
        let mut transport = StreamTransport::new(a, "duplex");

        transport.send(b"AT\r").await.unwrap();
        let mut buf = [0u8; 8];
        let n = b.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"AT\r");

        b.write_all(b"OK\r\n").await.unwrap();
        let n = transport
            .receive(&mut buf, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"OK\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn receive_times_out_when_silent() {
        let (a, _b) = tokio::io::duplex(64);
        let mut transport = StreamTransport::new(a, "duplex");
        let mut buf = [0u8; 8];
        let result = transport.receive(&mut buf, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn receive_reports_eof_as_zero() {
        let (a, b) = tokio::io::duplex(64);
        drop(b);
        let mut transport = StreamTransport::new(a, "duplex");
        let mut buf = [0u8; 8];
        let n = transport
            .receive(&mut buf, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn closed_transport_is_not_connected() {
        let (a, _b) = tokio::io::duplex(64);
        let mut transport = StreamTransport::new(a, "duplex");
        assert!(transport.is_connected());
        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        assert!(matches!(transport.send(b"AT\r").await, Err(Error::NotConnected)));
    }

    #[test]
    fn broken_pipe_maps_to_connection_lost() {
        let e = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(matches!(map_io_error(e), Error::ConnectionLost));
        let e = std::io::Error::new(std::io::ErrorKind::Other, "odd");
        assert!(matches!(map_io_error(e), Error::Io(_)));
    }
}
