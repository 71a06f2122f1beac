//! The `serve` command: a host answering bridge calls over TCP.

use crate::allow_list::AllowListArgs;
use crate::overrides_file::load_overrides;
use anyhow::Result;
use clap::Args;
use framebridge::{AllowList, Bridge, IpcServer, IpcServerHandle, Metadata, MethodTable, OverrideMap};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    pub port: u16,

    /// Origin this host identifies as
    #[arg(long, default_value = "http://localhost")]
    pub origin: String,

    #[command(flatten)]
    pub allow: AllowListArgs,

    /// JSON file of static method overrides
    #[arg(long)]
    pub overrides: Option<PathBuf>,

    /// Name reported by the `metadata` control call
    #[arg(long)]
    pub name: Option<String>,

    /// Image URL reported by the `metadata` control call
    #[arg(long)]
    pub image: Option<String>,
}

/// Methods exposed to every connected peer.
pub fn demo_target() -> MethodTable {
    MethodTable::new()
        .with("echo", |params: Vec<Value>| async move { Ok(Value::Array(params)) })
        .with("ping", |_params: Vec<Value>| async move { Ok(json!("pong")) })
}

/// Bind the host and serve one bridge endpoint per connection.
pub async fn start(args: &ServeArgs) -> Result<IpcServerHandle> {
    let allow_list = args.allow.build()?;
    let overrides = match &args.overrides {
        Some(path) => {
            let map = load_overrides(path)?;
            info!("Loaded {} overrides from {}", map.len(), path.display());
            map
        }
        None => OverrideMap::new(),
    };
    let metadata = (args.name.is_some() || args.image.is_some()).then(|| Metadata {
        name: args.name.clone(),
        image_url: args.image.clone(),
    });

    serve(&args.host, args.port, &args.origin, allow_list, overrides, metadata).await
}

pub async fn serve(
    host: &str,
    port: u16,
    origin: &str,
    allow_list: AllowList,
    overrides: OverrideMap,
    metadata: Option<Metadata>,
) -> Result<IpcServerHandle> {
    let target = demo_target();

    let handle = IpcServer::start((host, port), origin, move |port| {
        debug!("Serving bridge for {}", port.peer_origin());
        let mut builder = Bridge::builder(port, allow_list.clone())
            .target(target.clone())
            .overrides(overrides.clone());
        if let Some(metadata) = &metadata {
            builder = builder.metadata(metadata.clone());
        }
        tokio::spawn(builder.start().join());
    })
    .await?;

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use framebridge::IpcClient;

    #[tokio::test]
    async fn test_serve_answers_echo_and_ping() {
        let handle = serve(
            "127.0.0.1",
            0,
            "http://localhost",
            AllowList::exact(["https://app.example"]).unwrap(),
            OverrideMap::new().fail("ping", Some("ping disabled".into())),
            None,
        )
        .await
        .unwrap();

        let port = IpcClient::connect(handle.addr(), "https://app.example").await.unwrap();
        let client = Bridge::builder(port, AllowList::exact(["http://localhost"]).unwrap()).start();
        let proxy = client.proxy();

        assert_eq!(proxy.invoke("echo", vec![json!(1), json!("a")]).await.unwrap(), json!([1, "a"]));
        assert_eq!(proxy.invoke("ping", vec![]).await.unwrap_err().to_string(), "ping disabled");
        assert_eq!(proxy.metadata().await.unwrap(), None);
    }
}
