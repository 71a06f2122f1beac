//! TCP client side of the socket transport.

use super::link::{handshake, link};
use crate::channel::Port;
use crate::config::IpcConfig;
use crate::error::{BridgeError, Result};
use crate::origin::normalize_origin;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tracing::debug;

/// Connects to an [`IpcServer`](super::IpcServer).
pub struct IpcClient;

impl IpcClient {
    /// Connect to `addr` as `origin` and return a port linked to the server.
    ///
    /// Uses `IpcConfig::CONNECT_TIMEOUT` for the TCP connect and
    /// `IpcConfig::HELLO_TIMEOUT` for the hello exchange.
    pub async fn connect(addr: SocketAddr, origin: &str) -> Result<Port> {
        let origin = normalize_origin(origin)?;

        let mut stream = tokio::time::timeout(IpcConfig::CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| BridgeError::transport(format!("Timed out connecting to {}", addr)))?
            .map_err(|e| BridgeError::transport(format!("Failed to connect to {}: {}", addr, e)))?;

        let peer_origin = handshake(&mut stream, &origin).await?;
        debug!("Connected to {} at {}", peer_origin, addr);

        let (port, _pump) = link(stream, origin, peer_origin, None);
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::TargetOrigin;
    use crate::ipc::server::IpcServer;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_client_and_server_exchange_envelopes() {
        let (tx, mut server_ports) = mpsc::unbounded_channel();
        let handle = IpcServer::start("127.0.0.1:0", "https://host.example", move |port| {
            let _ = tx.send(port);
        })
        .await
        .unwrap();

        let mut client = IpcClient::connect(handle.addr(), "https://app.example").await.unwrap();
        assert_eq!(client.peer_origin(), "https://host.example");
        let mut server = server_ports.recv().await.unwrap();

        client.sender().post(json!("ping"), &TargetOrigin::Any).unwrap();
        let env = server.recv().await.unwrap();
        assert_eq!(env.origin, "https://app.example");
        assert_eq!(env.data, json!("ping"));

        server.sender().post(json!("pong"), &TargetOrigin::Any).unwrap();
        let env = client.recv().await.unwrap();
        assert_eq!(env.origin, "https://host.example");
        assert_eq!(env.source, client.peer_id());
        assert_eq!(env.data, json!("pong"));
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = IpcClient::connect(addr, "https://app.example").await.unwrap_err();
        assert!(matches!(err, BridgeError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_server_shutdown_closes_client_port() {
        let (tx, mut server_ports) = mpsc::unbounded_channel();
        let mut handle = IpcServer::start("127.0.0.1:0", "https://host.example", move |port| {
            let _ = tx.send(port);
        })
        .await
        .unwrap();

        let client = IpcClient::connect(handle.addr(), "https://app.example").await.unwrap();
        let _server = server_ports.recv().await.unwrap();

        handle.shutdown();
        client.sender().closed().await;
        assert!(client.sender().post(json!(1), &TargetOrigin::Any).is_err());
    }
}
