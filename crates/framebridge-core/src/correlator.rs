//! Request correlation for outbound calls.
//!
//! Every call mints a fresh correlation id, parks a waiter in the pending
//! registry and posts a [`RequestMessage`]. Inbound envelopes are offered to
//! [`RequestCorrelator::handle_incoming`], which settles the matching waiter
//! once the envelope's id, source context and (depending on [`TrustMode`])
//! origin all check out.
//!
//! # Lifecycle
//!
//! A pending entry is owned by a guard living inside the call future. Whether
//! the call succeeds, fails, times out, fails to transmit or is dropped, the
//! guard removes the entry, so a late response for a settled id finds no
//! waiter and is ignored.

use crate::channel::{ContextId, Envelope, Port, PortSender, TargetOrigin};
use crate::config::TrustMode;
use crate::error::{BridgeError, Result};
use crate::message::{CallMeta, RequestMessage, ResponseMessage};
use crate::origin::AllowList;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

/// Successful outcome of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResponse {
    /// Value returned by the counterpart.
    pub value: Value,
    /// Origin the response was received from.
    pub origin: String,
}

type Waiter = oneshot::Sender<(ResponseMessage, String)>;
type PendingMap = HashMap<String, Waiter>;

/// Issues calls across the boundary and matches responses to them.
///
/// Cheap to clone; clones share the pending registry.
#[derive(Debug, Clone)]
pub struct RequestCorrelator {
    inner: Arc<CorrelatorInner>,
}

#[derive(Debug)]
struct CorrelatorInner {
    sender: PortSender,
    counterpart: ContextId,
    allow_list: AllowList,
    mode: TrustMode,
    pending: Mutex<PendingMap>,
}

/// Removes a pending entry when the owning call finishes, however it finishes.
struct PendingGuard<'a> {
    pending: &'a Mutex<PendingMap>,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

fn lock(pending: &Mutex<PendingMap>) -> MutexGuard<'_, PendingMap> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RequestCorrelator {
    /// Create a correlator that posts through `sender` and only accepts
    /// responses from the `counterpart` context.
    pub fn new(
        sender: PortSender,
        counterpart: ContextId,
        allow_list: AllowList,
        mode: TrustMode,
    ) -> Self {
        debug!("Request correlator using {} trust mode", mode);
        Self {
            inner: Arc::new(CorrelatorInner {
                sender,
                counterpart,
                allow_list,
                mode,
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create a correlator talking to `port`'s counterpart.
    pub fn for_port(port: &Port, allow_list: AllowList, mode: TrustMode) -> Self {
        Self::new(port.sender(), port.peer_id(), allow_list, mode)
    }

    /// Which transmission discipline is active.
    pub fn trust_mode(&self) -> TrustMode {
        self.inner.mode
    }

    /// Number of calls still waiting for a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Call `method` on the counterpart.
    ///
    /// With a `timeout`, the call fails with [`BridgeError::Timeout`] if no
    /// matching response arrives in time. Without one it waits indefinitely.
    pub async fn call(
        &self,
        method: &str,
        params: Vec<Value>,
        meta: CallMeta,
        timeout: Option<Duration>,
    ) -> Result<CallResponse> {
        let (id, rx) = self.register();
        let _guard = PendingGuard {
            pending: &self.inner.pending,
            id: id.clone(),
        };

        let request = RequestMessage::new(id.as_str(), method, params, &meta);
        let payload = serde_json::to_value(&request)?;
        self.transmit(payload)?;
        debug!("Sent request {} for method '{}'", id, method);

        let settled = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(settled) => settled,
                Err(_) => {
                    debug!("Request {} for method '{}' timed out", id, method);
                    return Err(BridgeError::Timeout(limit));
                }
            },
            None => rx.await,
        };

        let (response, origin) = settled.map_err(|_| BridgeError::Closed)?;
        let value = response.into_result()?;
        Ok(CallResponse { value, origin })
    }

    /// Offer an inbound envelope to the pending calls.
    ///
    /// Returns `true` when the envelope settled a call. Envelopes that are not
    /// responses, come from another context, come from a disallowed origin or
    /// name no pending id are left alone.
    pub fn handle_incoming(&self, envelope: &Envelope) -> bool {
        let Some(response) = ResponseMessage::parse(&envelope.data) else {
            return false;
        };

        if envelope.source != self.inner.counterpart {
            debug!(
                "Ignoring response {} from unexpected context {}",
                response.id(),
                envelope.source
            );
            return false;
        }

        if self.inner.mode == TrustMode::RestrictReceive
            && !self.inner.allow_list.is_allowed(&envelope.origin)
        {
            warn!(
                "Ignoring response {} from disallowed origin {}",
                response.id(),
                envelope.origin
            );
            return false;
        }

        let waiter = lock(&self.inner.pending).remove(response.id());
        match waiter {
            Some(tx) => {
                debug!("Settling request {} from {}", response.id(), envelope.origin);
                let _ = tx.send((response, envelope.origin.clone()));
                true
            }
            None => {
                debug!("No pending call for response {}", response.id());
                false
            }
        }
    }

    /// Fail every pending call with [`BridgeError::Closed`].
    pub fn close(&self) {
        let drained: Vec<_> = lock(&self.inner.pending).drain().collect();
        if !drained.is_empty() {
            debug!("Closing correlator with {} pending calls", drained.len());
        }
    }

    fn register(&self) -> (String, oneshot::Receiver<(ResponseMessage, String)>) {
        let (tx, rx) = oneshot::channel();
        let mut pending = lock(&self.inner.pending);
        let mut id = Uuid::new_v4().to_string();
        while pending.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }
        pending.insert(id.clone(), tx);
        (id, rx)
    }

    fn transmit(&self, payload: Value) -> Result<()> {
        match self.inner.mode {
            TrustMode::RestrictReceive => self.inner.sender.post(payload, &TargetOrigin::Any),
            TrustMode::RestrictSend => {
                let targets = self.inner.allow_list.send_targets();
                if targets.is_empty() {
                    return Err(BridgeError::config(
                        "Allow-list names no origin that requests can be sent to",
                    ));
                }
                for target in &targets {
                    self.inner.sender.post(payload.clone(), target)?;
                }
                Ok(())
            }
        }
    }
}
