//! One endpoint of the boundary.
//!
//! A bridge owns a [`Port`] and runs a single receive loop over it. Every
//! inbound envelope is first offered to the endpoint's [`RequestCorrelator`];
//! anything it does not consume goes to the [`MethodDispatcher`], when the
//! endpoint answers requests at all. Each request is handled on its own task,
//! so a slow handler never holds up responses to this endpoint's own calls.

use crate::channel::{Envelope, Port};
use crate::config::TrustMode;
use crate::correlator::RequestCorrelator;
use crate::dispatcher::{DispatcherBuilder, MethodDispatcher};
use crate::origin::AllowList;
use crate::overrides::OverrideResolver;
use crate::proxy::RemoteProxy;
use crate::target::{MethodTarget, Metadata, SignerProvider};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Entry point for building a bridge endpoint.
pub struct Bridge;

impl Bridge {
    /// Start configuring an endpoint over `port` that trusts `allow_list`.
    pub fn builder(port: Port, allow_list: AllowList) -> BridgeBuilder {
        BridgeBuilder {
            port,
            allow_list,
            mode: TrustMode::default(),
            answer_requests: false,
            target: None,
            signers: None,
            overrides: None,
            signer_overrides: None,
            metadata: None,
        }
    }
}

/// Builder for a bridge endpoint.
///
/// Setting any dispatch collaborator makes the endpoint answer requests.
pub struct BridgeBuilder {
    port: Port,
    allow_list: AllowList,
    mode: TrustMode,
    answer_requests: bool,
    target: Option<Arc<dyn MethodTarget>>,
    signers: Option<Arc<dyn SignerProvider>>,
    overrides: Option<Arc<dyn OverrideResolver>>,
    signer_overrides: Option<Arc<dyn OverrideResolver>>,
    metadata: Option<Metadata>,
}

impl BridgeBuilder {
    pub fn trust_mode(mut self, mode: TrustMode) -> Self {
        self.mode = mode;
        self
    }

    /// Answer requests even without a target, e.g. only the `ready` probe.
    pub fn answer_requests(mut self) -> Self {
        self.answer_requests = true;
        self
    }

    pub fn target(mut self, target: impl MethodTarget + 'static) -> Self {
        self.target = Some(Arc::new(target));
        self.answer_requests = true;
        self
    }

    pub fn signer_provider(mut self, provider: impl SignerProvider + 'static) -> Self {
        self.signers = Some(Arc::new(provider));
        self.answer_requests = true;
        self
    }

    pub fn overrides(mut self, resolver: impl OverrideResolver + 'static) -> Self {
        self.overrides = Some(Arc::new(resolver));
        self.answer_requests = true;
        self
    }

    pub fn signer_overrides(mut self, resolver: impl OverrideResolver + 'static) -> Self {
        self.signer_overrides = Some(Arc::new(resolver));
        self.answer_requests = true;
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self.answer_requests = true;
        self
    }

    /// Spawn the receive loop. Must be called inside a tokio runtime.
    pub fn start(self) -> BridgeHandle {
        let correlator = RequestCorrelator::for_port(&self.port, self.allow_list.clone(), self.mode);

        let dispatcher = self.answer_requests.then(|| {
            let mut builder =
                DispatcherBuilder::new(self.port.sender(), self.port.peer_id(), self.allow_list);
            if let Some(target) = self.target {
                builder = builder.target_arc(target);
            }
            if let Some(signers) = self.signers {
                builder = builder.signer_provider_arc(signers);
            }
            if let Some(overrides) = self.overrides {
                builder = builder.overrides_arc(overrides);
            }
            if let Some(overrides) = self.signer_overrides {
                builder = builder.signer_overrides_arc(overrides);
            }
            if let Some(metadata) = self.metadata {
                builder = builder.metadata(metadata);
            }
            builder.build()
        });

        debug!(
            "Starting bridge {} -> {} ({}, answering requests: {})",
            self.port.origin(),
            self.port.peer_origin(),
            self.mode,
            dispatcher.is_some()
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task_handle = tokio::spawn(receive_loop(self.port, correlator.clone(), dispatcher, shutdown_rx));

        BridgeHandle {
            correlator,
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
        }
    }
}

async fn receive_loop(
    mut port: Port,
    correlator: RequestCorrelator,
    dispatcher: Option<MethodDispatcher>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let peer = port.sender();
    loop {
        // Inbox first: a response posted just before the counterpart went
        // away must still reach the correlator.
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                debug!("Bridge on {} shutting down", port.origin());
                break;
            }
            envelope = port.recv() => {
                let Some(envelope) = envelope else {
                    break;
                };
                route(envelope, &correlator, dispatcher.as_ref());
            }
            _ = peer.closed() => {
                while let Some(envelope) = port.try_recv() {
                    route(envelope, &correlator, dispatcher.as_ref());
                }
                debug!("Counterpart {} went away", peer.peer_origin());
                break;
            }
        }
    }
}

fn route(envelope: Envelope, correlator: &RequestCorrelator, dispatcher: Option<&MethodDispatcher>) {
    if correlator.handle_incoming(&envelope) {
        return;
    }
    if let Some(dispatcher) = dispatcher {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.handle(envelope).await;
        });
    }
}

/// Handle to a running bridge endpoint. Dropping it shuts the endpoint down.
///
/// The receive loop also stops on its own once the counterpart port is gone.
/// Calls still pending at that point are left to their deadline.
pub struct BridgeHandle {
    correlator: RequestCorrelator,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    pub fn correlator(&self) -> &RequestCorrelator {
        &self.correlator
    }

    /// Calling facade without a deadline.
    pub fn proxy(&self) -> RemoteProxy {
        RemoteProxy::new(self.correlator.clone())
    }

    pub fn trust_mode(&self) -> TrustMode {
        self.correlator.trust_mode()
    }

    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the receive loop and fail every pending call with `Closed`.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.correlator.close();
    }

    /// Wait for the receive loop to exit.
    pub async fn join(mut self) {
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::channel::TargetOrigin;
    use crate::message::{RequestMessage, ResponseMessage, SignerKind};
    use crate::target::{MethodTable, SignerFactory};
    use serde_json::{json, Value};
    use std::time::Duration;

    const HOST: &str = "https://host.example";
    const APP: &str = "https://app.example";

    fn host_target() -> MethodTable {
        MethodTable::new().with("getKey", |params: Vec<Value>| async move {
            Ok(json!({"chainId": params.first().cloned().unwrap_or(Value::Null)}))
        })
    }

    #[tokio::test]
    async fn test_frame_calls_host() {
        let (host_port, frame_port) = Port::pair(HOST, APP);
        let _host = Bridge::builder(host_port, AllowList::exact([APP]).unwrap())
            .target(host_target())
            .signer_provider(SignerFactory::new(|_chain: String, _kind: SignerKind| async move {
                let signer = MethodTable::new().with("getAccounts", |_p: Vec<Value>| async move {
                    Ok(json!(["cosmos1abc..."]))
                });
                Ok(Arc::new(signer) as Arc<dyn MethodTarget>)
            }))
            .start();
        let frame = Bridge::builder(frame_port, AllowList::exact([HOST]).unwrap()).start();

        let proxy = frame.proxy();
        assert_eq!(proxy.get_key("cosmoshub-4").await.unwrap(), json!({"chainId": "cosmoshub-4"}));
        let accounts = proxy
            .signer("cosmoshub-4", SignerKind::Amino)
            .get_accounts()
            .await
            .unwrap();
        assert_eq!(accounts, json!(["cosmos1abc..."]));
        assert_eq!(frame.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_both_sides_can_call_each_other() {
        let (host_port, frame_port) = Port::pair(HOST, APP);
        let host = Bridge::builder(host_port, AllowList::exact([APP]).unwrap())
            .target(host_target())
            .start();
        let frame = Bridge::builder(frame_port, AllowList::exact([HOST]).unwrap())
            .target(MethodTable::new().with("ping", |_p: Vec<Value>| async move { Ok(json!("pong")) }))
            .start();

        let frame_proxy = frame.proxy();
        let host_proxy = host.proxy();
        let (from_frame, from_host) = tokio::join!(
            frame_proxy.get_key("juno-1"),
            host_proxy.invoke("ping", vec![])
        );
        assert_eq!(from_frame.unwrap(), json!({"chainId": "juno-1"}));
        assert_eq!(from_host.unwrap(), json!("pong"));
    }

    #[tokio::test]
    async fn test_ready_probe_without_target() {
        let (host_port, frame_port) = Port::pair(HOST, APP);
        let _host = Bridge::builder(host_port, AllowList::exact([APP]).unwrap())
            .answer_requests()
            .start();
        let frame = Bridge::builder(frame_port, AllowList::exact([HOST]).unwrap()).start();

        assert!(frame.proxy().ready().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_without_dispatcher_never_answers() {
        let (host_port, frame_port) = Port::pair(HOST, APP);
        let _host = Bridge::builder(host_port, AllowList::exact([APP]).unwrap()).start();
        let frame = Bridge::builder(frame_port, AllowList::exact([HOST]).unwrap()).start();

        let err = frame
            .proxy()
            .with_timeout(Duration::from_secs(1))
            .ready()
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_shutdown_fails_pending_calls() {
        let (host_port, frame_port) = Port::pair(HOST, APP);
        let _host = Bridge::builder(host_port, AllowList::exact([APP]).unwrap())
            .target(MethodTable::new().with("hang", |_p: Vec<Value>| async move {
                futures::future::pending::<()>().await;
                Ok(Value::Null)
            }))
            .start();
        let mut frame = Bridge::builder(frame_port, AllowList::exact([HOST]).unwrap()).start();

        let proxy = frame.proxy();
        let call = tokio::spawn(async move { proxy.invoke("hang", vec![]).await });
        while frame.correlator().pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        frame.shutdown();
        assert!(matches!(call.await.unwrap(), Err(BridgeError::Closed)));
        frame.join().await;
    }

    #[tokio::test]
    async fn test_response_posted_before_counterpart_leaves_is_delivered() {
        for _ in 0..100 {
            let (mut host_port, frame_port) = Port::pair(HOST, APP);
            let frame = Bridge::builder(frame_port, AllowList::exact([HOST]).unwrap()).start();
            let proxy = frame.proxy().with_timeout(Duration::from_secs(5));
            let call = tokio::spawn(async move { proxy.invoke("getKey", vec![]).await });

            let envelope = host_port.recv().await.unwrap();
            let request = RequestMessage::parse(&envelope.data).unwrap();
            host_port
                .sender()
                .post(
                    serde_json::to_value(ResponseMessage::success(request.id, json!("ok"))).unwrap(),
                    &TargetOrigin::Any,
                )
                .unwrap();
            drop(host_port);

            assert_eq!(call.await.unwrap().unwrap(), json!("ok"));
            assert_eq!(frame.correlator().pending_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_trust_mode_is_reported() {
        let (_host_port, frame_port) = Port::pair(HOST, APP);
        let frame = Bridge::builder(frame_port, AllowList::exact([HOST]).unwrap())
            .trust_mode(TrustMode::RestrictSend)
            .start();
        assert_eq!(frame.trust_mode(), TrustMode::RestrictSend);
        assert!(frame.is_running());
    }
}
