//! Calling-side facade over a [`RequestCorrelator`].
//!
//! [`RemoteProxy::invoke`] forwards any method name with positional params.
//! The typed wrappers below are thin conveniences for the known wallet
//! surface and add nothing on the wire.

use crate::config::BridgeConfig;
use crate::correlator::RequestCorrelator;
use crate::error::Result;
use crate::message::{CallMeta, SignerKind};
use crate::target::Metadata;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

/// Property names whose value is a per-chain utility namespace.
pub const NESTED_NAMESPACES: [&str; 2] = ["getEnigmaUtils", "getEncryptionUtils"];

/// Generic calling facade.
#[derive(Debug, Clone)]
pub struct RemoteProxy {
    correlator: RequestCorrelator,
    timeout: Option<Duration>,
}

impl RemoteProxy {
    /// Proxy without a deadline.
    pub fn new(correlator: RequestCorrelator) -> Self {
        Self {
            correlator,
            timeout: None,
        }
    }

    /// Fail calls that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_default_timeout(self) -> Self {
        self.with_timeout(BridgeConfig::DEFAULT_CALL_TIMEOUT)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn correlator(&self) -> &RequestCorrelator {
        &self.correlator
    }

    /// Call `method` on the counterpart's target object.
    pub async fn invoke(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.call_with(method, params, CallMeta::generic()).await
    }

    /// Call `method` and deserialize the result.
    pub async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let value = self.invoke(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn call_with(&self, method: &str, params: Vec<Value>, meta: CallMeta) -> Result<Value> {
        let response = self
            .correlator
            .call(method, params, meta, self.timeout)
            .await?;
        Ok(response.value)
    }

    /// Liveness probe answered by the counterpart's dispatcher itself.
    pub async fn ready(&self) -> Result<bool> {
        let value = self.call_with("ready", vec![], CallMeta::internal()).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Host metadata, `None` when the host has none configured.
    pub async fn metadata(&self) -> Result<Option<Metadata>> {
        let value = self.call_with("metadata", vec![], CallMeta::internal()).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn enable(&self, chain_ids: &[&str]) -> Result<Value> {
        self.invoke("enable", vec![json!(chain_ids)]).await
    }

    pub async fn get_key(&self, chain_id: &str) -> Result<Value> {
        self.invoke("getKey", vec![json!(chain_id)]).await
    }

    pub async fn sign_amino(
        &self,
        chain_id: &str,
        signer: &str,
        sign_doc: Value,
        options: Option<Value>,
    ) -> Result<Value> {
        self.invoke("signAmino", with_options(vec![json!(chain_id), json!(signer), sign_doc], options))
            .await
    }

    pub async fn sign_direct(
        &self,
        chain_id: &str,
        signer: &str,
        sign_doc: Value,
        options: Option<Value>,
    ) -> Result<Value> {
        self.invoke("signDirect", with_options(vec![json!(chain_id), json!(signer), sign_doc], options))
            .await
    }

    pub async fn sign_arbitrary(&self, chain_id: &str, signer: &str, data: Value) -> Result<Value> {
        self.invoke("signArbitrary", vec![json!(chain_id), json!(signer), data])
            .await
    }

    pub async fn suggest_chain(&self, chain_info: Value) -> Result<Value> {
        self.invoke("experimentalSuggestChain", vec![chain_info]).await
    }

    pub async fn send_tx(&self, chain_id: &str, tx: Value, mode: &str) -> Result<Value> {
        self.invoke("sendTx", vec![json!(chain_id), tx, json!(mode)]).await
    }

    /// Facade for the `kind` signer of `chain_id`.
    pub fn signer(&self, chain_id: impl Into<String>, kind: SignerKind) -> SignerProxy {
        SignerProxy {
            proxy: self.clone(),
            chain_id: chain_id.into(),
            kind,
        }
    }

    /// Nested utility namespace, when `name` designates one.
    pub fn namespace(&self, name: &str, chain_id: impl Into<String>) -> Option<UtilityNamespace> {
        NESTED_NAMESPACES
            .contains(&name)
            .then(|| UtilityNamespace {
                proxy: self.clone(),
                chain_id: chain_id.into(),
            })
    }

    pub fn enigma_utils(&self, chain_id: impl Into<String>) -> UtilityNamespace {
        UtilityNamespace {
            proxy: self.clone(),
            chain_id: chain_id.into(),
        }
    }
}

fn with_options(mut params: Vec<Value>, options: Option<Value>) -> Vec<Value> {
    if let Some(options) = options {
        params.push(options);
    }
    params
}

/// Calls on one chain's signer. Every request carries the chain id and signer kind.
#[derive(Debug, Clone)]
pub struct SignerProxy {
    proxy: RemoteProxy,
    chain_id: String,
    kind: SignerKind,
}

impl SignerProxy {
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn kind(&self) -> SignerKind {
        self.kind
    }

    pub async fn invoke(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let meta = CallMeta::signer(self.chain_id.as_str(), self.kind);
        self.proxy.call_with(method, params, meta).await
    }

    pub async fn get_accounts(&self) -> Result<Value> {
        self.invoke("getAccounts", vec![]).await
    }

    pub async fn sign_amino(&self, signer: &str, sign_doc: Value) -> Result<Value> {
        self.invoke("signAmino", vec![json!(signer), sign_doc]).await
    }

    pub async fn sign_direct(&self, signer: &str, sign_doc: Value) -> Result<Value> {
        self.invoke("signDirect", vec![json!(signer), sign_doc]).await
    }
}

/// Per-chain encryption utilities. The chain id is prepended to every call.
#[derive(Debug, Clone)]
pub struct UtilityNamespace {
    proxy: RemoteProxy,
    chain_id: String,
}

impl UtilityNamespace {
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub async fn invoke(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let mut full = Vec::with_capacity(params.len() + 1);
        full.push(json!(self.chain_id));
        full.extend(params);
        self.proxy.invoke(method, full).await
    }

    pub async fn get_pubkey(&self) -> Result<Value> {
        self.invoke("getPubkey", vec![]).await
    }

    pub async fn encrypt(&self, contract_code_hash: &str, msg: Value) -> Result<Value> {
        self.invoke("encrypt", vec![json!(contract_code_hash), msg]).await
    }

    pub async fn decrypt(&self, ciphertext: Value, nonce: Value) -> Result<Value> {
        self.invoke("decrypt", vec![ciphertext, nonce]).await
    }

    pub async fn get_tx_encryption_key(&self, nonce: Value) -> Result<Value> {
        self.invoke("getTxEncryptionKey", vec![nonce]).await
    }
}
