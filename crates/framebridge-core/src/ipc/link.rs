//! Joins a socket to a [`Port`].
//!
//! After the hello exchange, a linked pair of ports is created: the local end
//! is handed to the caller, the remote end is driven by a pump task that
//! forwards socket frames into the local inbox and local posts onto the
//! socket. The remote end's origin is the one the peer claimed in its hello,
//! so target-origin filtering on local posts happens before anything is
//! written.

use super::protocol::{read_message, write_message, Frame};
use crate::channel::{Port, PortSender, TargetOrigin};
use crate::config::IpcConfig;
use crate::error::{BridgeError, Result};
use crate::origin::normalize_origin;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Exchange hellos and return the peer's normalised origin.
pub(crate) async fn handshake(stream: &mut TcpStream, origin: &str) -> Result<String> {
    let (mut reader, mut writer) = stream.split();
    write_message(
        &mut writer,
        &Frame::Hello {
            origin: origin.to_string(),
        },
    )
    .await?;

    let first = tokio::time::timeout(IpcConfig::HELLO_TIMEOUT, read_message(&mut reader))
        .await
        .map_err(|_| BridgeError::transport("Timed out waiting for hello"))??;

    match first {
        Some(Frame::Hello { origin }) => normalize_origin(&origin),
        Some(Frame::Message { .. }) => Err(BridgeError::transport("Expected hello frame")),
        None => Err(BridgeError::transport("Connection closed during hello")),
    }
}

/// Link `stream` to a new port and spawn the pump task.
///
/// The pump stops when the socket closes, when the returned port is dropped,
/// or once `shutdown` flips to `true`.
pub(crate) fn link(
    stream: TcpStream,
    local_origin: String,
    peer_origin: String,
    shutdown: Option<watch::Receiver<bool>>,
) -> (Port, JoinHandle<()>) {
    let (local, remote) = Port::pair(local_origin, peer_origin);
    let task = tokio::spawn(pump(stream, remote, shutdown));
    (local, task)
}

async fn pump(stream: TcpStream, remote: Port, shutdown: Option<watch::Receiver<bool>>) {
    let peer = remote.origin().to_string();
    let (reader, writer) = stream.into_split();
    let inbound = remote.sender();
    let local_gone = remote.sender();

    tokio::select! {
        result = read_loop(reader, inbound) => {
            if let Err(e) = result {
                debug!("Connection to {} ended: {}", peer, e);
            }
        }
        result = write_loop(writer, remote) => {
            if let Err(e) = result {
                debug!("Connection to {} ended: {}", peer, e);
            }
        }
        _ = local_gone.closed() => {
            debug!("Port for {} dropped, closing connection", peer);
        }
        _ = wait_for_shutdown(shutdown) => {
            debug!("Closing connection to {} on shutdown", peer);
        }
    }
}

async fn read_loop(mut reader: OwnedReadHalf, inbound: PortSender) -> Result<()> {
    loop {
        match read_message(&mut reader).await? {
            // Already filtered by the sending side against our origin.
            Some(Frame::Message { data }) => inbound.post(data, &TargetOrigin::Any)?,
            Some(Frame::Hello { .. }) => debug!("Ignoring repeated hello"),
            None => return Ok(()),
        }
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut remote: Port) -> Result<()> {
    while let Some(envelope) = remote.recv().await {
        write_message(&mut writer, &Frame::Message { data: envelope.data }).await?;
    }
    Ok(())
}

async fn wait_for_shutdown(shutdown: Option<watch::Receiver<bool>>) {
    match shutdown {
        Some(mut rx) => {
            let _ = rx.wait_for(|stop| *stop).await;
        }
        None => futures::future::pending::<()>().await,
    }
}
