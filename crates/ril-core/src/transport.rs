//! Transport trait for the modem link.
//!
//! The [`Transport`] trait abstracts over the byte stream to the modem.
//! Implementations exist for serial character devices, loopback TCP, local
//! (Unix-domain) sockets, and the scripted mock modem used in tests.
//!
//! The AT channel operates on a `Transport` rather than directly on a file
//! descriptor, enabling both real modems and deterministic unit testing
//! with `MockModem` from the `ril-test-harness` crate.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a modem.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the modem, returning once all bytes are written.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the modem into the provided buffer.
    ///
    /// Returns the number of bytes read. Waits up to `timeout` for data;
    /// returns [`Error::Timeout`](crate::error::Error::Timeout) if nothing
    /// arrives. A return of `Ok(0)` means the peer closed the stream.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
