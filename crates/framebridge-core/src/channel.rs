//! Boundary messaging substrate.
//!
//! A [`Port`] is one browsing context's view of the boundary: an inbox of
//! [`Envelope`]s and a [`PortSender`] that posts into its counterpart's inbox.
//! Every envelope is stamped by the substrate with the posting context's id
//! and origin, so receivers can trust both. Posting is fire-and-forget and
//! honours a target-origin filter: a message whose target does not address the
//! receiver's origin is dropped without an error, the way a window messaging
//! substrate behaves.

use crate::error::{BridgeError, Result};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Identity of a browsing context on the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which receiving origin a posted message may be delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOrigin {
    /// Deliver regardless of the receiver's origin. Displays as `"*"`.
    Any,
    /// Deliver only if the receiver's origin is exactly this one.
    Exact(String),
}

impl TargetOrigin {
    pub fn addresses(&self, origin: &str) -> bool {
        match self {
            TargetOrigin::Any => true,
            TargetOrigin::Exact(target) => target == origin,
        }
    }
}

impl std::fmt::Display for TargetOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetOrigin::Any => write!(f, "*"),
            TargetOrigin::Exact(origin) => write!(f, "{}", origin),
        }
    }
}

/// A message as observed by the receiving context.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Context that posted the message.
    pub source: ContextId,
    /// Origin of the posting context.
    pub origin: String,
    /// Structured payload.
    pub data: Value,
}

/// Posting half of a port. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PortSender {
    source: ContextId,
    origin: String,
    peer_origin: String,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl PortSender {
    /// Post `data` to the counterpart if `target` addresses its origin.
    ///
    /// A filtered message is not an error. Fails only when the counterpart
    /// is gone.
    pub fn post(&self, data: Value, target: &TargetOrigin) -> Result<()> {
        if !target.addresses(&self.peer_origin) {
            debug!(
                "Dropping message for {}: counterpart origin is {}",
                target, self.peer_origin
            );
            return Ok(());
        }

        self.tx
            .send(Envelope {
                source: self.source,
                origin: self.origin.clone(),
                data,
            })
            .map_err(|_| BridgeError::transport("counterpart context is closed"))
    }

    /// Context id stamped on everything this sender posts.
    pub fn source(&self) -> ContextId {
        self.source
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn peer_origin(&self) -> &str {
        &self.peer_origin
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the counterpart port has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// One context's end of a boundary.
#[derive(Debug)]
pub struct Port {
    id: ContextId,
    origin: String,
    peer: ContextId,
    sender: PortSender,
    inbox_tx: mpsc::UnboundedSender<Envelope>,
    inbox: mpsc::UnboundedReceiver<Envelope>,
}

impl Port {
    /// Create two linked contexts, e.g. a host window and the frame it embeds.
    pub fn pair(origin_a: impl Into<String>, origin_b: impl Into<String>) -> (Port, Port) {
        let origin_a = origin_a.into();
        let origin_b = origin_b.into();
        let id_a = ContextId::new();
        let id_b = ContextId::new();
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Port {
            id: id_a,
            origin: origin_a.clone(),
            peer: id_b,
            sender: PortSender {
                source: id_a,
                origin: origin_a.clone(),
                peer_origin: origin_b.clone(),
                tx: tx_b.clone(),
            },
            inbox_tx: tx_a.clone(),
            inbox: rx_a,
        };
        let b = Port {
            id: id_b,
            origin: origin_b.clone(),
            peer: id_a,
            sender: PortSender {
                source: id_b,
                origin: origin_b,
                peer_origin: origin_a,
                tx: tx_a,
            },
            inbox_tx: tx_b,
            inbox: rx_b,
        };

        (a, b)
    }

    /// A sender for some other context, unrelated to this port's counterpart,
    /// that holds a reference to this context and posts from `origin`.
    pub fn open_sender(&self, origin: impl Into<String>) -> PortSender {
        PortSender {
            source: ContextId::new(),
            origin: origin.into(),
            peer_origin: self.origin.clone(),
            tx: self.inbox_tx.clone(),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Id of the counterpart context.
    pub fn peer_id(&self) -> ContextId {
        self.peer
    }

    pub fn peer_origin(&self) -> &str {
        self.sender.peer_origin()
    }

    pub fn sender(&self) -> PortSender {
        self.sender.clone()
    }

    /// Wait for the next inbound envelope.
    ///
    /// Never returns `None` while the port itself is alive, since it keeps
    /// its own inbox open for [`Port::open_sender`].
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.inbox.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.inbox.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_pair_delivers_with_source_and_origin() {
        let (host, mut frame) = Port::pair("https://host.example", "https://app.example");

        host.sender()
            .post(json!({"hello": 1}), &TargetOrigin::Any)
            .unwrap();

        let env = frame.recv().await.unwrap();
        assert_eq!(env.source, host.id());
        assert_eq!(env.source, frame.peer_id());
        assert_eq!(env.origin, "https://host.example");
        assert_eq!(env.data, json!({"hello": 1}));
    }

    #[tokio::test]
    async fn test_target_origin_filter_drops_silently() {
        let (host, mut frame) = Port::pair("https://host.example", "https://app.example");
        let sender = host.sender();

        sender
            .post(json!(1), &TargetOrigin::Exact("https://other.example".into()))
            .unwrap();
        sender
            .post(json!(2), &TargetOrigin::Exact("https://app.example".into()))
            .unwrap();

        let env = frame.recv().await.unwrap();
        assert_eq!(env.data, json!(2));
        assert!(frame.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_post_to_dropped_port_is_transport_error() {
        let (host, frame) = Port::pair("https://host.example", "https://app.example");
        drop(frame);

        let result = host.sender().post(json!(null), &TargetOrigin::Any);
        assert!(matches!(result, Err(BridgeError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_open_sender_is_a_distinct_context() {
        let (host, mut frame) = Port::pair("https://host.example", "https://app.example");
        let stranger = frame.open_sender("https://evil.example");

        stranger.post(json!("x"), &TargetOrigin::Any).unwrap();

        let env = frame.recv().await.unwrap();
        assert_ne!(env.source, host.id());
        assert_eq!(env.origin, "https://evil.example");
    }
}
