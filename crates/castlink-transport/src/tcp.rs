use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::Connector;

/// Port cast devices listen on for the device socket.
pub const DEFAULT_CAST_PORT: u16 = 8009;

/// TCP transport to a cast device.
///
/// Host names are resolved through the system resolver; every resolved
/// address is tried in order until one accepts.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    nodelay: bool,
}

impl TcpConnector {
    /// Create a connector with `TCP_NODELAY` enabled.
    pub fn new() -> Self {
        Self { nodelay: true }
    }

    /// Toggle `TCP_NODELAY` on connected streams.
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| TransportError::Connect {
                addr: addr.clone(),
                source,
            })?;
        stream.set_nodelay(self.nodelay)?;
        debug!(%addr, nodelay = self.nodelay, "connected tcp stream");
        Ok(stream)
    }

    fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn connect_and_exchange_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut client = TcpConnector::new().connect("127.0.0.1", port).await.unwrap();
        client.write_all(b"hello").await.unwrap();

        assert_eq!(&server.await.unwrap(), b"hello");
        assert!(client.nodelay().unwrap());
    }

    #[tokio::test]
    async fn refused_connection_reports_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = TcpConnector::new()
            .connect("127.0.0.1", port)
            .await
            .unwrap_err();
        match err {
            TransportError::Connect { addr, .. } => assert_eq!(addr, format!("127.0.0.1:{port}")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn transport_name_and_defaults() {
        let connector = TcpConnector::default().with_nodelay(false);
        assert_eq!(connector.transport_name(), "tcp");
        assert!(!connector.nodelay);
        assert_eq!(DEFAULT_CAST_PORT, 8009);
    }
}
