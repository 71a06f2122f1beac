//! TCP server side of the socket transport.
//!
//! Every accepted peer gets its own [`Port`], handed to the connection
//! callback once the hello exchange has completed. The envelopes arriving on
//! that port carry the origin the peer claimed in its hello.
//!
//! # Thread Safety
//!
//! The accept loop and every connection pump run as separate tokio tasks. The
//! callback may be invoked concurrently from several connection tasks.

use super::link::{handshake, link};
use crate::channel::Port;
use crate::config::IpcConfig;
use crate::error::Result;
use crate::origin::normalize_origin;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Handle to a running server. Dropping shuts down the server.
pub struct IpcServerHandle {
    addr: SocketAddr,
    active_connections: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl IpcServerHandle {
    /// Address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections currently open.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Stop accepting connections and close every open one.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }
}

impl Drop for IpcServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

type ConnectionCallback = Arc<dyn Fn(Port) + Send + Sync>;

/// Server accepting frames over TCP.
pub struct IpcServer;

impl IpcServer {
    /// Bind `addr` and serve as `origin`.
    ///
    /// `on_connection` receives the local port of every peer.
    pub async fn start<A, F>(addr: A, origin: &str, on_connection: F) -> Result<IpcServerHandle>
    where
        A: ToSocketAddrs,
        F: Fn(Port) + Send + Sync + 'static,
    {
        let origin = normalize_origin(origin)?;
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        info!("Bridge server listening on {} as {}", addr, origin);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let active_connections = Arc::new(AtomicUsize::new(0));

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            origin,
            Arc::new(on_connection),
            shutdown_rx,
            conn_shutdown_rx,
            active_connections.clone(),
        ));

        Ok(IpcServerHandle {
            addr,
            active_connections,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        origin: String,
        on_connection: ConnectionCallback,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
        active_connections: Arc<AtomicUsize>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Bridge server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let current = active_connections.load(Ordering::Relaxed);
                            if current >= IpcConfig::MAX_CONNECTIONS {
                                warn!(
                                    "Rejecting connection from {}: at max capacity ({})",
                                    peer_addr,
                                    IpcConfig::MAX_CONNECTIONS
                                );
                                continue;
                            }

                            active_connections.fetch_add(1, Ordering::Relaxed);
                            let origin = origin.clone();
                            let on_connection = on_connection.clone();
                            let conns = active_connections.clone();
                            let conn_shutdown = conn_shutdown_rx.clone();

                            tokio::spawn(async move {
                                debug!("Connection from {}", peer_addr);
                                if let Err(e) = Self::handle_connection(
                                    stream,
                                    &origin,
                                    &on_connection,
                                    conn_shutdown,
                                )
                                .await
                                {
                                    debug!("Connection {} ended: {}", peer_addr, e);
                                }
                                conns.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        origin: &str,
        on_connection: &ConnectionCallback,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let peer_origin = handshake(&mut stream, origin).await?;
        debug!("Peer identified as {}", peer_origin);

        let (port, pump) = link(stream, origin.to_string(), peer_origin, Some(shutdown_rx));
        on_connection(port);
        let _ = pump.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::TargetOrigin;
    use crate::ipc::protocol::{read_message, write_message, Frame};
    use serde_json::json;
    use tokio::sync::mpsc;

    const HOST: &str = "https://host.example";

    async fn start_collecting() -> (IpcServerHandle, mpsc::UnboundedReceiver<Port>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = IpcServer::start("127.0.0.1:0", HOST, move |port| {
            let _ = tx.send(port);
        })
        .await
        .unwrap();
        (handle, rx)
    }

    #[tokio::test]
    async fn test_server_start_and_shutdown() {
        let (mut handle, _ports) = start_collecting().await;
        assert!(handle.port() > 0);
        assert_eq!(handle.addr().ip(), std::net::Ipv4Addr::LOCALHOST);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_rejects_invalid_own_origin() {
        let result = IpcServer::start("127.0.0.1:0", "*", |_port| {}).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_hello_then_messages_over_raw_socket() {
        let (handle, mut ports) = start_collecting().await;

        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();
        let (mut reader, mut writer) = stream.split();
        write_message(&mut writer, &Frame::Hello { origin: "https://App.Example:443".into() })
            .await
            .unwrap();
        assert_eq!(
            read_message(&mut reader).await.unwrap(),
            Some(Frame::Hello { origin: HOST.into() })
        );

        let mut port = ports.recv().await.unwrap();
        assert_eq!(port.peer_origin(), "https://app.example");

        write_message(&mut writer, &Frame::Message { data: json!({"n": 1}) })
            .await
            .unwrap();
        let env = port.recv().await.unwrap();
        assert_eq!(env.origin, "https://app.example");
        assert_eq!(env.source, port.peer_id());
        assert_eq!(env.data, json!({"n": 1}));

        port.sender()
            .post(json!("filtered"), &TargetOrigin::Exact("https://other.example".into()))
            .unwrap();
        port.sender()
            .post(json!("delivered"), &TargetOrigin::Exact("https://app.example".into()))
            .unwrap();
        assert_eq!(
            read_message(&mut reader).await.unwrap(),
            Some(Frame::Message { data: json!("delivered") })
        );
    }

    #[tokio::test]
    async fn test_message_before_hello_drops_connection() {
        let (handle, mut ports) = start_collecting().await;

        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();
        let (mut reader, mut writer) = stream.split();
        write_message(&mut writer, &Frame::Message { data: json!(1) }).await.unwrap();

        // Server hello, then EOF.
        assert!(matches!(read_message(&mut reader).await.unwrap(), Some(Frame::Hello { .. })));
        assert_eq!(read_message(&mut reader).await.unwrap(), None);
        assert!(ports.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_closes_open_connections() {
        let (mut handle, mut ports) = start_collecting().await;

        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();
        let (mut reader, mut writer) = stream.split();
        write_message(&mut writer, &Frame::Hello { origin: "https://app.example".into() })
            .await
            .unwrap();
        read_message(&mut reader).await.unwrap();
        let _port = ports.recv().await.unwrap();

        handle.shutdown();
        assert_eq!(read_message(&mut reader).await.unwrap(), None);
    }
}
