//! Caller-supplied method overrides.
//!
//! Before the dispatcher touches the target object or a signer, it asks an
//! [`OverrideResolver`] what to do with the call. The answer is an
//! [`OverrideDecision`]: short-circuit with a value, short-circuit with a
//! failure, or defer to normal resolution.
//!
//! Two resolvers ship with the crate:
//! - [`OverrideMap`]: a fixed table of per-method handlers, ignoring the chain id.
//! - [`OverrideFactory`]: builds an [`OverrideMap`] per call, optionally
//!   depending on the chain id of a signer-scoped call.

use crate::error::Result;
use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// What to do with an intercepted call.
///
/// Deserializes from `"defer"`, `{"value": <any>}` or `{"fail": <string|null>}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideDecision {
    /// Resolve the call normally.
    Defer,
    /// Succeed with this value without calling the real handler.
    Value(Value),
    /// Fail with this message, or the default phrase when absent or empty.
    Fail(Option<String>),
}

impl OverrideDecision {
    pub fn fail(message: impl Into<String>) -> Self {
        OverrideDecision::Fail(Some(message.into()))
    }
}

/// Handler for one overridden method. Receives the original params.
pub type OverrideFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<OverrideDecision>> + Send + Sync>;

/// Decides how a method call is resolved.
#[async_trait::async_trait]
pub trait OverrideResolver: Send + Sync {
    /// Decide for `method`. `chain_id` is set for signer-scoped calls only.
    async fn resolve(
        &self,
        method: &str,
        params: &[Value],
        chain_id: Option<&str>,
    ) -> Result<OverrideDecision>;
}

/// Static mapping from method name to override handler.
#[derive(Clone, Default)]
pub struct OverrideMap {
    handlers: HashMap<String, OverrideFn>,
}

impl std::fmt::Debug for OverrideMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<_> = self.handlers.keys().collect();
        methods.sort();
        f.debug_struct("OverrideMap").field("methods", &methods).finish()
    }
}

impl OverrideMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map of fixed decisions.
    pub fn from_decisions(decisions: HashMap<String, OverrideDecision>) -> Self {
        decisions
            .into_iter()
            .fold(Self::new(), |map, (method, decision)| map.decision(method, decision))
    }

    /// Register an async handler for `method`.
    pub fn with<F, Fut>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<OverrideDecision>> + Send + 'static,
    {
        let handler: OverrideFn = Arc::new(move |params| handler(params).boxed());
        self.handlers.insert(method.into(), handler);
        self
    }

    /// Always answer `method` with `decision`.
    pub fn decision(self, method: impl Into<String>, decision: OverrideDecision) -> Self {
        self.with(method, move |_params| {
            let decision = decision.clone();
            async move { Ok(decision) }
        })
    }

    /// Always succeed `method` with `value`.
    pub fn value(self, method: impl Into<String>, value: Value) -> Self {
        self.decision(method, OverrideDecision::Value(value))
    }

    /// Always fail `method`.
    pub fn fail(self, method: impl Into<String>, message: Option<String>) -> Self {
        self.decision(method, OverrideDecision::Fail(message))
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler for `method`, or defer when there is none.
    pub async fn decide(&self, method: &str, params: &[Value]) -> Result<OverrideDecision> {
        match self.handlers.get(method) {
            Some(handler) => handler(params.to_vec()).await,
            None => Ok(OverrideDecision::Defer),
        }
    }
}

#[async_trait::async_trait]
impl OverrideResolver for OverrideMap {
    async fn resolve(
        &self,
        method: &str,
        params: &[Value],
        _chain_id: Option<&str>,
    ) -> Result<OverrideDecision> {
        self.decide(method, params).await
    }
}

/// Produces an [`OverrideMap`] for every call.
///
/// The factory receives the chain id of signer-scoped calls and `None` for
/// generic calls.
pub struct OverrideFactory<F> {
    factory: F,
}

impl<F, Fut> OverrideFactory<F>
where
    F: Fn(Option<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<OverrideMap>> + Send + 'static,
{
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

#[async_trait::async_trait]
impl<F, Fut> OverrideResolver for OverrideFactory<F>
where
    F: Fn(Option<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<OverrideMap>> + Send + 'static,
{
    async fn resolve(
        &self,
        method: &str,
        params: &[Value],
        chain_id: Option<&str>,
    ) -> Result<OverrideDecision> {
        let map = (self.factory)(chain_id.map(str::to_string)).await?;
        map.decide(method, params).await
    }
}
