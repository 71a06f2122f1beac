//! Framebridge - origin-checked request/response bridge between an embedded
//! frame and its host.
//!
//! Two browsing contexts that can only exchange fire-and-forget messages get
//! an async call interface on top: a call is tagged with a correlation id, the
//! other side validates the sender's identity and origin, resolves the method
//! against an injected target (or a per-chain signer), and posts the outcome
//! back to the exact origin the request came from.
//!
//! For the command-line host and client, see the `framebridge-rpc` crate.
//!
//! # Example
//!
//! ```rust
//! use framebridge::{AllowList, Bridge, MethodTable, Port};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> framebridge::Result<()> {
//!     let (host_port, frame_port) = Port::pair("https://wallet.example", "https://dapp.example");
//!
//!     let _host = Bridge::builder(host_port, AllowList::exact(["https://dapp.example"])?)
//!         .target(MethodTable::new().with("getKey", |params: Vec<Value>| async move {
//!             Ok(json!({"chainId": params[0]}))
//!         }))
//!         .start();
//!
//!     let frame = Bridge::builder(frame_port, AllowList::exact(["https://wallet.example"])?).start();
//!     let key = frame.proxy().get_key("cosmoshub-4").await?;
//!     assert_eq!(key, json!({"chainId": "cosmoshub-4"}));
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod channel;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod ipc;
pub mod message;
pub mod origin;
pub mod overrides;
pub mod proxy;
pub mod target;

// Re-export commonly used types
pub use bridge::{Bridge, BridgeBuilder, BridgeHandle};
pub use channel::{ContextId, Envelope, Port, PortSender, TargetOrigin};
pub use config::{BridgeConfig, IpcConfig, TrustMode};
pub use correlator::{CallResponse, RequestCorrelator};
pub use dispatcher::{normalize_method, DispatcherBuilder, MethodDispatcher};
pub use error::{BridgeError, Result};
pub use ipc::{IpcClient, IpcServer, IpcServerHandle};
pub use message::{CallMeta, RequestMessage, ResponseMessage, SignerKind};
pub use origin::{is_allowed, normalize_origin, AllowList, OriginSpec};
pub use overrides::{OverrideDecision, OverrideFactory, OverrideMap, OverrideResolver};
pub use proxy::{RemoteProxy, SignerProxy, UtilityNamespace, NESTED_NAMESPACES};
pub use target::{MethodTable, MethodTarget, Metadata, SignerFactory, SignerProvider};
