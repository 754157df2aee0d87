//! Loopback TCP transport.
//!
//! Emulators and modem multiplexers commonly expose the AT port as a TCP
//! listener on `127.0.0.1`. Only the port is configurable.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use ril_core::error::{Error, Result};
use ril_core::transport::Transport;
use tokio::net::TcpStream;

use crate::stream::StreamTransport;

/// Connection timeout for the loopback connect.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to `127.0.0.1:<port>`.
pub async fn connect_loopback(port: u16) -> Result<Box<dyn Transport>> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    tracing::debug!(addr = %addr, "Connecting to loopback AT port");

    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Transport(format!("connect to {addr} timed out")))?
        .map_err(|e| Error::Transport(format!("connect to {addr} failed: {e}")))?;

    if let Err(e) = stream.set_nodelay(true) {
        tracing::warn!(addr = %addr, error = %e, "Failed to set TCP_NODELAY");
    }

    tracing::info!(addr = %addr, "Loopback AT port connected");
    Ok(Box::new(StreamTransport::new(stream, addr.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_and_sends() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = sock.read(&mut buf).await.unwrap();
            buf[..n].to_vec()
        });

        let mut transport = connect_loopback(port).await.unwrap();
        assert!(transport.is_connected());
        transport.send(b"ATE0\r").await.unwrap();
        assert_eq!(server.await.unwrap(), b"ATE0\r");
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        // Bind then drop to get a port with no listener.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = connect_loopback(port).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
