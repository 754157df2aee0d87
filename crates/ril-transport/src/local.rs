//! Local (Unix-domain) socket transport.

use std::path::Path;

use ril_core::error::{Error, Result};
use ril_core::transport::Transport;
use tokio::net::UnixStream;

use crate::stream::StreamTransport;

/// Connect to a stream socket in the filesystem namespace.
pub async fn connect_local(path: &Path) -> Result<Box<dyn Transport>> {
    let label = path.display().to_string();
    tracing::debug!(socket = %label, "Connecting to local AT socket");

    let stream = UnixStream::connect(path)
        .await
        .map_err(|e| Error::Transport(format!("connect to {label} failed: {e}")))?;

    tracing::info!(socket = %label, "Local AT socket connected");
    Ok(Box::new(StreamTransport::new(stream, label)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn connects_and_receives() {
        let dir = std::env::temp_dir().join(format!("ril-local-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("at.sock");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"RING\r\n").await.unwrap();
            // Hold the socket open until the client has read.
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        });

        let mut transport = connect_local(&path).await.unwrap();
        let mut buf = [0u8; 16];
        let n = transport
            .receive(&mut buf, std::time::Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"RING\r\n");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_socket_is_transport_error() {
        let result = connect_local(Path::new("/nonexistent/ril/at.sock")).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
