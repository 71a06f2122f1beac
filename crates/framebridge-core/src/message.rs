//! Wire schema shared by both sides of the boundary.
//!
//! ```text
//! Request  { id, method, params: [..], chainId?, signerType?, signType?, internal? }
//! Response { id, type: "success", response } | { id, type: "error", error }
//! ```
//!
//! `signType` is the deprecated spelling of `signerType` and is only read when
//! `signerType` is absent.

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Wallet signing mode a signer-scoped call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerKind {
    /// Legacy JSON-encoded signing.
    Amino,
    /// Protobuf-encoded signing.
    Direct,
}

impl SignerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerKind::Amino => "amino",
            SignerKind::Direct => "direct",
        }
    }
}

impl FromStr for SignerKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "amino" => Ok(SignerKind::Amino),
            "direct" => Ok(SignerKind::Direct),
            other => Err(BridgeError::Validation {
                field: "signer_type".to_string(),
                message: format!("Unknown signer type '{}', expected 'amino' or 'direct'", other),
            }),
        }
    }
}

impl std::fmt::Display for SignerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-call routing data attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallMeta {
    pub chain_id: Option<String>,
    pub signer_type: Option<SignerKind>,
    pub internal: bool,
}

impl CallMeta {
    /// Metadata for an ordinary call on the target object.
    pub fn generic() -> Self {
        Self::default()
    }

    /// Metadata for a call on the `kind` signer of `chain_id`.
    pub fn signer(chain_id: impl Into<String>, kind: SignerKind) -> Self {
        Self {
            chain_id: Some(chain_id.into()),
            signer_type: Some(kind),
            internal: false,
        }
    }

    /// Metadata for an internal control call.
    pub fn internal() -> Self {
        Self {
            internal: true,
            ..Self::default()
        }
    }
}

/// A request crossing the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMessage {
    pub id: String,
    pub method: String,
    pub params: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_type: Option<SignerKind>,
    /// Deprecated alias of `signer_type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_type: Option<SignerKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal: Option<bool>,
}

impl RequestMessage {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Vec<Value>, meta: &CallMeta) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
            chain_id: meta.chain_id.clone(),
            signer_type: meta.signer_type,
            sign_type: None,
            internal: meta.internal.then_some(true),
        }
    }

    /// Parse a boundary payload. Anything not shaped like a request is `None`.
    pub fn parse(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }

    /// The signer kind, honouring the deprecated alias only when the
    /// canonical field is absent.
    pub fn signer_kind(&self) -> Option<SignerKind> {
        self.signer_type.or(self.sign_type)
    }

    pub fn is_internal(&self) -> bool {
        self.internal.unwrap_or(false)
    }
}

/// A response crossing the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseMessage {
    Success {
        id: String,
        #[serde(default)]
        response: Value,
    },
    Error {
        id: String,
        error: String,
    },
}

impl ResponseMessage {
    pub fn success(id: impl Into<String>, response: Value) -> Self {
        ResponseMessage::Success {
            id: id.into(),
            response,
        }
    }

    pub fn error(id: impl Into<String>, error: impl Into<String>) -> Self {
        ResponseMessage::Error {
            id: id.into(),
            error: error.into(),
        }
    }

    /// Build a response from a computed outcome.
    pub fn from_outcome(id: impl Into<String>, outcome: Result<Value, String>) -> Self {
        match outcome {
            Ok(value) => Self::success(id, value),
            Err(message) => Self::error(id, message),
        }
    }

    /// Parse a boundary payload. Anything not shaped like a response is `None`.
    pub fn parse(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }

    pub fn id(&self) -> &str {
        match self {
            ResponseMessage::Success { id, .. } | ResponseMessage::Error { id, .. } => id,
        }
    }

    /// Convert into the caller-side result. Errors become [`BridgeError::Remote`].
    pub fn into_result(self) -> Result<Value, BridgeError> {
        match self {
            ResponseMessage::Success { response, .. } => Ok(response),
            ResponseMessage::Error { error, .. } => Err(BridgeError::Remote(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let meta = CallMeta::signer("cosmoshub-4", SignerKind::Amino);
        let req = RequestMessage::new("abc", "getAccounts", vec![], &meta);
        let value = serde_json::to_value(&req).unwrap();

        assert_eq!(
            value,
            json!({
                "id": "abc",
                "method": "getAccounts",
                "params": [],
                "chainId": "cosmoshub-4",
                "signerType": "amino"
            })
        );
    }

    #[test]
    fn test_internal_flag_only_serialized_when_set() {
        let req = RequestMessage::new("1", "ready", vec![], &CallMeta::internal());
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["internal"], json!(true));

        let req = RequestMessage::new("2", "echo", vec![], &CallMeta::generic());
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("internal").is_none());
    }

    #[test]
    fn test_request_requires_id_method_params() {
        assert!(RequestMessage::parse(&json!({"id": "1", "method": "m", "params": []})).is_some());
        assert!(RequestMessage::parse(&json!({"method": "m", "params": []})).is_none());
        assert!(RequestMessage::parse(&json!({"id": "1", "params": []})).is_none());
        assert!(RequestMessage::parse(&json!({"id": "1", "method": "m"})).is_none());
        assert!(RequestMessage::parse(&json!("hello")).is_none());
    }

    #[test]
    fn test_deprecated_sign_type_alias() {
        let req = RequestMessage::parse(&json!({
            "id": "1", "method": "signAmino", "params": [], "chainId": "c", "signType": "amino"
        }))
        .unwrap();
        assert_eq!(req.signer_kind(), Some(SignerKind::Amino));

        let req = RequestMessage::parse(&json!({
            "id": "1", "method": "signDirect", "params": [], "chainId": "c",
            "signerType": "direct", "signType": "amino"
        }))
        .unwrap();
        assert_eq!(req.signer_kind(), Some(SignerKind::Direct));
    }

    #[test]
    fn test_response_wire_shape() {
        let ok = serde_json::to_value(ResponseMessage::success("1", json!([1, 2]))).unwrap();
        assert_eq!(ok, json!({"id": "1", "type": "success", "response": [1, 2]}));

        let err = serde_json::to_value(ResponseMessage::error("2", "nope")).unwrap();
        assert_eq!(err, json!({"id": "2", "type": "error", "error": "nope"}));
    }

    #[test]
    fn test_requests_and_responses_do_not_overlap() {
        let req = json!({"id": "1", "method": "m", "params": []});
        let resp = json!({"id": "1", "type": "success", "response": null});
        assert!(ResponseMessage::parse(&req).is_none());
        assert!(RequestMessage::parse(&resp).is_none());
    }

    #[test]
    fn test_missing_success_value_is_null() {
        let resp = ResponseMessage::parse(&json!({"id": "1", "type": "success"})).unwrap();
        assert_eq!(resp.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_error_response_into_remote_error() {
        let err = ResponseMessage::error("1", "rejected").into_result().unwrap_err();
        assert!(matches!(err, BridgeError::Remote(ref m) if m == "rejected"));
    }

    #[test]
    fn test_signer_kind_from_str() {
        assert_eq!("Amino".parse::<SignerKind>().unwrap(), SignerKind::Amino);
        assert_eq!("direct".parse::<SignerKind>().unwrap(), SignerKind::Direct);
        assert!("textual".parse::<SignerKind>().is_err());
    }
}
