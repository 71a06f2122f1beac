//! The `call` command: issue one bridge call against a running host.

use crate::allow_list::AllowListArgs;
use anyhow::{bail, Context, Result};
use clap::Args;
use framebridge::{AllowList, Bridge, BridgeConfig, CallMeta, IpcClient, SignerKind};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Address of the host
    #[arg(long)]
    pub addr: SocketAddr,

    /// Origin this client identifies as
    #[arg(long, default_value = "http://localhost")]
    pub origin: String,

    /// Trusted host origins; defaults to the origin the host announces
    #[command(flatten)]
    pub allow: AllowListArgs,

    /// Method name
    #[arg(short, long)]
    pub method: String,

    /// Positional params as a JSON array
    #[arg(long, default_value = "[]")]
    pub params: String,

    /// Chain id for signer-scoped calls
    #[arg(long)]
    pub chain_id: Option<String>,

    /// Signer kind (amino or direct)
    #[arg(long)]
    pub signer_type: Option<SignerKind>,

    /// Send as an internal control call (ready, metadata)
    #[arg(long)]
    pub internal: bool,

    /// Give up after this many milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl CallArgs {
    pub fn params(&self) -> Result<Vec<Value>> {
        match serde_json::from_str::<Value>(&self.params).context("--params must be valid JSON")? {
            Value::Array(params) => Ok(params),
            other => bail!("--params must be a JSON array, got {}", other),
        }
    }

    pub fn meta(&self) -> Result<CallMeta> {
        if self.signer_type.is_some() && self.chain_id.is_none() {
            bail!("--signer-type requires --chain-id");
        }
        Ok(CallMeta {
            chain_id: self.chain_id.clone(),
            signer_type: self.signer_type,
            internal: self.internal,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(BridgeConfig::DEFAULT_CALL_TIMEOUT)
    }
}

/// Connect, call, and return the result value.
pub async fn run(args: &CallArgs) -> Result<Value> {
    let params = args.params()?;
    let meta = args.meta()?;

    let port = IpcClient::connect(args.addr, &args.origin).await?;
    let allow_list = if args.allow.is_empty() {
        AllowList::exact([port.peer_origin()])?
    } else {
        args.allow.build()?
    };
    debug!("Connected to {} at {}", port.peer_origin(), args.addr);

    let bridge = Bridge::builder(port, allow_list).start();
    let response = bridge
        .correlator()
        .call(&args.method, params, meta, Some(args.timeout()))
        .await?;
    debug!("Response from {}", response.origin);

    Ok(response.value)
}
