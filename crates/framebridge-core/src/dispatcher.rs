//! Receiving side of the bridge.
//!
//! The dispatcher turns one inbound envelope into at most one response:
//!
//! 1. Drop it unless it was posted by the expected counterpart context.
//! 2. Drop it unless its origin is on the allow-list.
//! 3. Drop it unless it is shaped like a request.
//! 4. Internal control calls (`ready`, `metadata`) are answered from a fixed
//!    table. Signer-scoped calls need a chain id. Everything else is generic.
//! 5. Strip the legacy method prefix.
//! 6. Ask the override resolver, then fall through to the signer or target.
//! 7. Flatten any failure (including a panic) into an error message.
//! 8. Post the response back to the origin validated in step 2.
//!
//! Dropped envelopes produce no response at all.

use crate::channel::{ContextId, Envelope, Port, PortSender, TargetOrigin};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::message::{RequestMessage, ResponseMessage, SignerKind};
use crate::origin::AllowList;
use crate::overrides::{OverrideDecision, OverrideResolver};
use crate::target::{MethodTarget, Metadata, SignerProvider};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Control calls answered by the dispatcher itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InternalMethod {
    /// Liveness probe.
    Ready,
    /// Host metadata.
    Metadata,
}

impl InternalMethod {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ready" => Some(InternalMethod::Ready),
            "metadata" => Some(InternalMethod::Metadata),
            _ => None,
        }
    }
}

/// Strip the legacy prefix older clients put in front of method names.
pub fn normalize_method(method: &str) -> &str {
    method
        .strip_prefix(BridgeConfig::LEGACY_METHOD_PREFIX)
        .unwrap_or(method)
}

/// Answers requests from one counterpart context.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct MethodDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    sender: PortSender,
    counterpart: ContextId,
    allow_list: AllowList,
    target: Option<Arc<dyn MethodTarget>>,
    signers: Option<Arc<dyn SignerProvider>>,
    overrides: Option<Arc<dyn OverrideResolver>>,
    signer_overrides: Option<Arc<dyn OverrideResolver>>,
    metadata: Option<Metadata>,
}

impl std::fmt::Debug for MethodDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDispatcher")
            .field("counterpart", &self.inner.counterpart)
            .field("allow_list", &self.inner.allow_list)
            .field("has_target", &self.inner.target.is_some())
            .field("has_signers", &self.inner.signers.is_some())
            .field("metadata", &self.inner.metadata)
            .finish()
    }
}

/// Builder for [`MethodDispatcher`].
///
/// # Example
///
/// ```rust
/// use framebridge::{AllowList, MethodDispatcher, MethodTable, Port};
/// use serde_json::{json, Value};
///
/// let (host, _frame) = Port::pair("https://host.example", "https://app.example");
/// let dispatcher = MethodDispatcher::builder_for_port(
///     &host,
///     AllowList::exact(["https://app.example"]).unwrap(),
/// )
/// .target(MethodTable::new().with("ping", |_p: Vec<Value>| async move { Ok(json!("pong")) }))
/// .build();
/// # let _ = dispatcher;
/// ```
pub struct DispatcherBuilder {
    sender: PortSender,
    counterpart: ContextId,
    allow_list: AllowList,
    target: Option<Arc<dyn MethodTarget>>,
    signers: Option<Arc<dyn SignerProvider>>,
    overrides: Option<Arc<dyn OverrideResolver>>,
    signer_overrides: Option<Arc<dyn OverrideResolver>>,
    metadata: Option<Metadata>,
}

impl DispatcherBuilder {
    pub fn new(sender: PortSender, counterpart: ContextId, allow_list: AllowList) -> Self {
        Self {
            sender,
            counterpart,
            allow_list,
            target: None,
            signers: None,
            overrides: None,
            signer_overrides: None,
            metadata: None,
        }
    }

    /// Object receiving generic calls.
    pub fn target(self, target: impl MethodTarget + 'static) -> Self {
        self.target_arc(Arc::new(target))
    }

    pub fn target_arc(mut self, target: Arc<dyn MethodTarget>) -> Self {
        self.target = Some(target);
        self
    }

    /// Provider of signers for signer-scoped calls.
    pub fn signer_provider(self, provider: impl SignerProvider + 'static) -> Self {
        self.signer_provider_arc(Arc::new(provider))
    }

    pub fn signer_provider_arc(mut self, provider: Arc<dyn SignerProvider>) -> Self {
        self.signers = Some(provider);
        self
    }

    /// Overrides consulted for generic calls.
    pub fn overrides(self, resolver: impl OverrideResolver + 'static) -> Self {
        self.overrides_arc(Arc::new(resolver))
    }

    pub fn overrides_arc(mut self, resolver: Arc<dyn OverrideResolver>) -> Self {
        self.overrides = Some(resolver);
        self
    }

    /// Overrides consulted for signer-scoped calls. The resolver sees the chain id.
    pub fn signer_overrides(self, resolver: impl OverrideResolver + 'static) -> Self {
        self.signer_overrides_arc(Arc::new(resolver))
    }

    pub fn signer_overrides_arc(mut self, resolver: Arc<dyn OverrideResolver>) -> Self {
        self.signer_overrides = Some(resolver);
        self
    }

    /// Descriptor returned by the `metadata` control call.
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn build(self) -> MethodDispatcher {
        MethodDispatcher {
            inner: Arc::new(DispatcherInner {
                sender: self.sender,
                counterpart: self.counterpart,
                allow_list: self.allow_list,
                target: self.target,
                signers: self.signers,
                overrides: self.overrides,
                signer_overrides: self.signer_overrides,
                metadata: self.metadata,
            }),
        }
    }
}

impl MethodDispatcher {
    pub fn builder(sender: PortSender, counterpart: ContextId, allow_list: AllowList) -> DispatcherBuilder {
        DispatcherBuilder::new(sender, counterpart, allow_list)
    }

    /// Builder for a dispatcher answering `port`'s counterpart.
    pub fn builder_for_port(port: &Port, allow_list: AllowList) -> DispatcherBuilder {
        DispatcherBuilder::new(port.sender(), port.peer_id(), allow_list)
    }

    /// Process one inbound envelope.
    ///
    /// Returns the response that was posted, or `None` when the envelope was
    /// dropped by validation.
    pub async fn handle(&self, envelope: Envelope) -> Option<ResponseMessage> {
        if envelope.source != self.inner.counterpart {
            debug!("Ignoring message from unexpected context {}", envelope.source);
            return None;
        }

        if !self.inner.allow_list.is_allowed(&envelope.origin) {
            warn!("Ignoring message from disallowed origin {}", envelope.origin);
            return None;
        }

        let request = RequestMessage::parse(&envelope.data)?;
        debug!("Dispatching '{}' ({}) from {}", request.method, request.id, envelope.origin);

        let outcome = self.outcome(&request).await;
        let response = ResponseMessage::from_outcome(request.id, outcome);

        match serde_json::to_value(&response) {
            Ok(payload) => {
                let target = TargetOrigin::Exact(envelope.origin);
                if let Err(e) = self.inner.sender.post(payload, &target) {
                    warn!("Failed to send response {}: {}", response.id(), e);
                }
            }
            Err(e) => error!("Failed to serialize response {}: {}", response.id(), e),
        }

        Some(response)
    }

    /// Compute the outcome of a request, converting every failure to a message.
    async fn outcome(&self, request: &RequestMessage) -> std::result::Result<Value, String> {
        match AssertUnwindSafe(self.resolve(request)).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!("Method '{}' failed: {}", request.method, e);
                Err(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Method '{}' panicked: {}", request.method, message);
                Err(message)
            }
        }
    }

    async fn resolve(&self, request: &RequestMessage) -> Result<Value> {
        if request.is_internal() {
            return self.resolve_internal(&request.method);
        }

        let method = normalize_method(&request.method);
        match request.signer_kind() {
            Some(kind) => {
                let chain_id = request
                    .chain_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        BridgeError::Other(format!(
                            "Missing chain id for {} signer method '{}'.",
                            kind, method
                        ))
                    })?;
                self.resolve_signer(kind, chain_id, method, &request.params).await
            }
            None => self.resolve_generic(method, &request.params).await,
        }
    }

    fn resolve_internal(&self, method: &str) -> Result<Value> {
        match InternalMethod::from_name(method) {
            Some(InternalMethod::Ready) => Ok(Value::Bool(true)),
            Some(InternalMethod::Metadata) => match &self.inner.metadata {
                Some(metadata) => Ok(serde_json::to_value(metadata)?),
                None => Ok(Value::Null),
            },
            None => Err(BridgeError::MethodNotFound(format!(
                "Unknown internal method '{}'.",
                method
            ))),
        }
    }

    async fn resolve_signer(
        &self,
        kind: SignerKind,
        chain_id: &str,
        method: &str,
        params: &[Value],
    ) -> Result<Value> {
        let resolver = self.inner.signer_overrides.as_deref();
        if let Some(value) = apply_override(resolver, method, params, Some(chain_id)).await? {
            return Ok(value);
        }

        let provider = self.inner.signers.as_ref().ok_or_else(|| {
            BridgeError::MethodNotFound(format!(
                "No {} signer method '{}' for chain id '{}'.",
                kind, method, chain_id
            ))
        })?;
        let signer = provider.signer(chain_id, kind).await?;
        if !signer.has_method(method) {
            return Err(BridgeError::MethodNotFound(format!(
                "No {} signer method '{}' for chain id '{}'.",
                kind, method, chain_id
            )));
        }

        signer.invoke(method, params.to_vec()).await
    }

    async fn resolve_generic(&self, method: &str, params: &[Value]) -> Result<Value> {
        let resolver = self.inner.overrides.as_deref();
        if let Some(value) = apply_override(resolver, method, params, None).await? {
            return Ok(value);
        }

        match &self.inner.target {
            Some(target) if target.has_method(method) => target.invoke(method, params.to_vec()).await,
            _ => Err(BridgeError::MethodNotFound(format!(
                "No method '{}' on target.",
                method
            ))),
        }
    }
}

/// `Ok(Some(value))` short-circuits, `Ok(None)` falls through.
async fn apply_override(
    resolver: Option<&dyn OverrideResolver>,
    method: &str,
    params: &[Value],
    chain_id: Option<&str>,
) -> Result<Option<Value>> {
    let Some(resolver) = resolver else {
        return Ok(None);
    };

    match resolver.resolve(method, params, chain_id).await? {
        OverrideDecision::Defer => Ok(None),
        OverrideDecision::Value(value) => Ok(Some(value)),
        OverrideDecision::Fail(message) => Err(BridgeError::Other(
            message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| BridgeConfig::DEFAULT_OVERRIDE_ERROR.to_string()),
        )),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}
