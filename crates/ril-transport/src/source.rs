//! Transport source selection and the connect-forever loop.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use ril_core::error::Result;
use ril_core::transport::Transport;
use tokio_util::sync::CancellationToken;

use crate::serial::{self, SerialConfig};
use crate::{local, tcp};

/// Where the modem's AT port lives. Exactly one is configured per daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSource {
    /// TCP client to `127.0.0.1:<port>`.
    Loopback(u16),
    /// Character device, raw mode when it is a tty.
    Device(PathBuf),
    /// Unix-domain stream socket in the filesystem namespace.
    LocalSocket(PathBuf),
}

impl fmt::Display for TransportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportSource::Loopback(port) => write!(f, "tcp:127.0.0.1:{port}"),
            TransportSource::Device(path) => write!(f, "device:{}", path.display()),
            TransportSource::LocalSocket(path) => write!(f, "socket:{}", path.display()),
        }
    }
}

impl TransportSource {
    /// Make one connection attempt.
    pub async fn connect(&self, serial: &SerialConfig) -> Result<Box<dyn Transport>> {
        match self {
            TransportSource::Loopback(port) => tcp::connect_loopback(*port).await,
            TransportSource::Device(path) => serial::open_device(path, serial).await,
            TransportSource::LocalSocket(path) => local::connect_local(path).await,
        }
    }

    /// Keep connecting until it works, sleeping `backoff` between attempts.
    ///
    /// During boot the modem driver may not be up yet, so failures here are
    /// logged and retried rather than surfaced. Returns `None` only if
    /// `cancel` fires first.
    pub async fn connect_forever(
        &self,
        serial: &SerialConfig,
        backoff: Duration,
        cancel: &CancellationToken,
    ) -> Option<Box<dyn Transport>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.connect(serial).await {
                Ok(transport) => return Some(transport),
                Err(e) => {
                    tracing::warn!(
                        source = %self,
                        attempt,
                        error = %e,
                        retry_in_s = backoff.as_secs(),
                        "Opening AT interface failed, retrying"
                    );
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn display_names_the_source() {
        assert_eq!(TransportSource::Loopback(5038).to_string(), "tcp:127.0.0.1:5038");
        assert_eq!(
            TransportSource::Device("/dev/ttyUSB2".into()).to_string(),
            "device:/dev/ttyUSB2"
        );
        assert_eq!(
            TransportSource::LocalSocket("/dev/socket/modem".into()).to_string(),
            "socket:/dev/socket/modem"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_forever_gives_up_only_on_cancel() {
        let source = TransportSource::LocalSocket("/nonexistent/ril/at.sock".into());
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(35)).await;
            canceller.cancel();
        });
        let result = source
            .connect_forever(&SerialConfig::default(), Duration::from_secs(10), &cancel)
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn connect_forever_returns_once_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _conn = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });
        let source = TransportSource::Loopback(port);
        let cancel = CancellationToken::new();
        let transport = source
            .connect_forever(&SerialConfig::default(), Duration::from_millis(10), &cancel)
            .await
            .unwrap();
        assert!(transport.is_connected());
    }
}
