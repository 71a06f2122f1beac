//! Collaborators the dispatcher forwards calls to.
//!
//! The bridge never interprets what a method does. A [`MethodTarget`] is a bag
//! of named async methods taking positional JSON params; the generic target and
//! every signer handed out by a [`SignerProvider`] implement it.

use crate::error::{BridgeError, Result};
use crate::message::SignerKind;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// A named-method bag invoked with positional JSON params.
#[async_trait::async_trait]
pub trait MethodTarget: Send + Sync {
    /// True when `name` exists and can be invoked.
    fn has_method(&self, name: &str) -> bool;

    /// Invoke `name` with `params` and return its result.
    async fn invoke(&self, name: &str, params: Vec<Value>) -> Result<Value>;
}

/// One method of a [`MethodTable`].
pub type MethodFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A [`MethodTarget`] assembled from closures.
///
/// # Example
///
/// ```rust
/// use framebridge::MethodTable;
/// use serde_json::{json, Value};
///
/// let signer = MethodTable::new()
///     .with("getAccounts", |_params: Vec<Value>| async move {
///         Ok(json!([{"address": "cosmos1abc"}]))
///     });
/// assert!(signer.method_names().contains(&"getAccounts"));
/// ```
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, MethodFn>,
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.method_names())
            .finish()
    }
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method.
    pub fn with<F, Fut>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let method: MethodFn = Arc::new(move |params| method(params).boxed());
        self.methods.insert(name.into(), method);
        self
    }

    /// Sorted method names.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait::async_trait]
impl MethodTarget for MethodTable {
    fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    async fn invoke(&self, name: &str, params: Vec<Value>) -> Result<Value> {
        let method = self
            .methods
            .get(name)
            .ok_or_else(|| BridgeError::MethodNotFound(format!("No method '{}' on target.", name)))?;
        method(params).await
    }
}

/// Hands out the signer for a chain and signing mode.
#[async_trait::async_trait]
pub trait SignerProvider: Send + Sync {
    async fn signer(&self, chain_id: &str, kind: SignerKind) -> Result<Arc<dyn MethodTarget>>;
}

/// A [`SignerProvider`] backed by a closure.
pub struct SignerFactory<F> {
    factory: F,
}

impl<F, Fut> SignerFactory<F>
where
    F: Fn(String, SignerKind) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Arc<dyn MethodTarget>>> + Send + 'static,
{
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

#[async_trait::async_trait]
impl<F, Fut> SignerProvider for SignerFactory<F>
where
    F: Fn(String, SignerKind) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Arc<dyn MethodTarget>>> + Send + 'static,
{
    async fn signer(&self, chain_id: &str, kind: SignerKind) -> Result<Arc<dyn MethodTarget>> {
        (self.factory)(chain_id.to_string(), kind).await
    }
}

/// Descriptor returned verbatim by the `metadata` control call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}
