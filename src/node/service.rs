//! Node Service
//!
//! Owns the `Union` state machine and the channel feeding it. Transport callbacks and
//! `NodeHandle` requests are both turned into `NodeEvent`s on that channel, so every
//! mutation of node state happens on the task running `run` / `run_hub`.

use super::correlator::RpcCallback;
use super::types::{NodeCommand, NodeConfig, NodeEvent, NodeStatus};
use super::union::Union;
use crate::protocol::types::{CorrelationIndex, Envelope, RpcError, RpcReply};
use crate::transport::peer::PeerHandle;
use crate::transport::tcp::TcpTransport;
use crate::transport::{ConnectionHandler, Transport};
use crate::unit::types::Unit;

use anyhow::Result;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Cloneable front door to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    events: mpsc::UnboundedSender<NodeEvent>,
}

impl NodeHandle {
    pub(crate) fn new(events: mpsc::UnboundedSender<NodeEvent>) -> Self {
        Self { events }
    }

    /// Routes a call to `unit_id`, local or remote. `callback` runs once with the outcome.
    pub fn invoke(
        &self,
        unit_id: &str,
        method: &str,
        args: Vec<Value>,
        with_result: bool,
        callback: RpcCallback,
    ) -> Result<(), RpcError> {
        let command = NodeCommand::Invoke {
            unit_id: unit_id.to_string(),
            method: method.to_string(),
            args,
            with_result,
            callback,
        };

        if self.send(NodeEvent::Command(command)) {
            Ok(())
        } else {
            Err(RpcError::NodeStopped)
        }
    }

    /// Calls `unit_id.method(args)` and waits for its result.
    pub async fn call(&self, unit_id: &str, method: &str, args: Vec<Value>) -> RpcReply {
        let (tx, rx) = oneshot::channel();

        self.invoke(
            unit_id,
            method,
            args,
            true,
            Box::new(move |reply| {
                let _ = tx.send(reply);
            }),
        )?;

        rx.await.unwrap_or(Err(RpcError::NodeStopped))
    }

    /// Calls `unit_id.method(args)` without asking for a result.
    pub fn notify(&self, unit_id: &str, method: &str, args: Vec<Value>) -> Result<(), RpcError> {
        let target = format!("{}.{}", unit_id, method);

        self.invoke(
            unit_id,
            method,
            args,
            false,
            Box::new(move |reply| {
                if let Err(e) = reply {
                    tracing::warn!("Notification {} failed: {}", target, e);
                }
            }),
        )
    }

    pub async fn status(&self) -> Result<NodeStatus> {
        let (tx, rx) = oneshot::channel();

        if !self.send(NodeEvent::Command(NodeCommand::Status(tx))) {
            anyhow::bail!("Node stopped");
        }

        Ok(rx.await?)
    }

    /// Asks the event loop to exit after the events already queued.
    pub fn shutdown(&self) {
        self.send(NodeEvent::Command(NodeCommand::Shutdown));
    }

    pub(crate) fn expire(&self, index: CorrelationIndex, timeout: Duration) {
        self.send(NodeEvent::Command(NodeCommand::Expire { index, timeout }));
    }

    fn send(&self, event: NodeEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

/// Adapts transport callbacks into node events.
struct NodeEvents {
    events: mpsc::UnboundedSender<NodeEvent>,
}

impl NodeEvents {
    fn forward(&self, event: NodeEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Node stopped; dropping transport event");
        }
    }
}

impl ConnectionHandler for NodeEvents {
    fn on_connected(&self, peer: PeerHandle) {
        self.forward(NodeEvent::Connected(peer));
    }

    fn on_closed(&self, peer: PeerHandle) {
        self.forward(NodeEvent::Closed(peer));
    }

    fn on_packet(&self, peer: PeerHandle, envelope: Envelope) {
        self.forward(NodeEvent::Packet(peer, envelope));
    }

    fn on_listening(&self, addr: SocketAddr) {
        self.forward(NodeEvent::Listening(addr));
    }

    fn on_dial_failed(&self, addr: &str, error: String) {
        self.forward(NodeEvent::DialFailed {
            addr: addr.to_string(),
            error,
        });
    }

    fn on_listen_failed(&self, addr: &str, error: String) {
        self.forward(NodeEvent::ListenFailed {
            addr: addr.to_string(),
            error,
        });
    }
}

/// A node: its local units plus the task that coordinates them with the cluster.
pub struct NodeService {
    union: Union,
    events: mpsc::UnboundedReceiver<NodeEvent>,
    handle: NodeHandle,
}

impl NodeService {
    /// Creates a node speaking TCP.
    pub fn new(name: &str, units: Vec<Unit>, config: NodeConfig) -> Result<Self> {
        Self::with_transport(name, units, config, |handler, config| {
            let transport = TcpTransport::new(
                &config.protocol_tag,
                handler,
                config.dial_retry.clone(),
            )?;
            Ok(Arc::new(transport) as Arc<dyn Transport>)
        })
    }

    /// Creates a node over a custom transport. `make_transport` receives the handler
    /// the transport must report connections to.
    pub fn with_transport<F>(
        name: &str,
        units: Vec<Unit>,
        config: NodeConfig,
        make_transport: F,
    ) -> Result<Self>
    where
        F: FnOnce(Arc<dyn ConnectionHandler>, &NodeConfig) -> Result<Arc<dyn Transport>>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = NodeHandle::new(tx.clone());

        let handler: Arc<dyn ConnectionHandler> = Arc::new(NodeEvents { events: tx });
        let transport = make_transport(handler, &config)?;
        let union = Union::new(name, units, config, transport, handle.clone())?;

        Ok(Self {
            union,
            events: rx,
            handle,
        })
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }

    /// Joins the cluster through `hub_addr` and processes events until shutdown.
    ///
    /// Returns `Err` if the hub cannot be reached or the assigned port cannot be bound.
    pub async fn run(mut self, hub_addr: &str) -> Result<()> {
        self.union.join(hub_addr);
        self.event_loop().await
    }

    /// Serves as the cluster hub on `listen_addr` and processes events until shutdown.
    pub async fn run_hub(mut self, listen_addr: &str) -> Result<()> {
        self.union.serve_as_hub(listen_addr);
        self.event_loop().await
    }

    async fn event_loop(mut self) -> Result<()> {
        while let Some(event) = self.events.recv().await {
            if let NodeEvent::Command(NodeCommand::Shutdown) = event {
                tracing::info!("Node shutting down");
                break;
            }

            self.union.handle_event(event)?;
        }

        Ok(())
    }
}
