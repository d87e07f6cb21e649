//! Protocol State Machine
//!
//! `Union` interprets every inbound envelope and local command for one node. It is
//! driven by `NodeService` from a single task, so its handlers run one at a time and
//! may mutate the directory, join map and pending calls freely.

use super::correlator::{RpcCallback, RpcCorrelator};
use super::directory::{JoinTracker, PeerDirectory};
use super::service::NodeHandle;
use super::startup::{Phase, StartupSync};
use super::types::{NodeCommand, NodeConfig, NodeEvent, NodeRole, NodeStatus};
use crate::hub::directory::{HubDirectory, QueryOutcome};
use crate::protocol::types::{CorrelationIndex, Envelope, RpcError, RpcRequest, RpcResponse};
use crate::transport::Transport;
use crate::transport::peer::PeerHandle;
use crate::unit::invoke::{Invocable, InvokeFuture};
use crate::unit::registry::UnitRegistry;
use crate::unit::types::Unit;

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub struct Union {
    name: String,
    config: NodeConfig,
    units: UnitRegistry,
    directory: PeerDirectory,
    joins: JoinTracker,
    correlator: RpcCorrelator,
    startup: StartupSync,
    /// Open connections by peer id.
    connections: HashMap<u64, PeerHandle>,
    hub: Option<HubDirectory>,
    hub_addr: Option<String>,
    listen_addr: Option<String>,
    transport: Arc<dyn Transport>,
    handle: NodeHandle,
}

impl Union {
    pub fn new(
        name: &str,
        units: Vec<Unit>,
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        handle: NodeHandle,
    ) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            config,
            units: UnitRegistry::new(units)?,
            directory: PeerDirectory::new(),
            joins: JoinTracker::new(),
            correlator: RpcCorrelator::new(),
            startup: StartupSync::new(),
            connections: HashMap::new(),
            hub: None,
            hub_addr: None,
            listen_addr: None,
            transport,
            handle,
        })
    }

    /// Dials the hub. Registration continues once the connection is up.
    pub fn join(&mut self, hub_addr: &str) {
        tracing::info!("Node {} joining cluster via hub {}", self.name, hub_addr);

        self.hub_addr = Some(hub_addr.to_string());
        self.transport.dial(hub_addr);
    }

    /// Becomes the hub: listens, then initializes and starts local units right away.
    pub fn serve_as_hub(&mut self, listen_addr: &str) {
        tracing::info!("Node {} serving as hub on {}", self.name, listen_addr);

        self.hub = Some(HubDirectory::new(
            self.config.hub_port_base,
            self.units.collect(),
        ));
        self.transport.listen(listen_addr);

        for dependency in self.units.depends() {
            if !self.units.contains(&dependency) {
                tracing::warn!("Hub unit dependency {} is not hosted by the hub", dependency);
            }
        }

        self.units.init_all(&self.handle);
        if self.startup.force_start() {
            self.units.start_all(&self.handle);
        }
    }

    pub fn role(&self) -> NodeRole {
        if self.hub.is_some() {
            NodeRole::Hub
        } else {
            NodeRole::Node
        }
    }

    pub fn phase(&self) -> Phase {
        self.startup.phase()
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    pub fn joins(&self) -> &JoinTracker {
        &self.joins
    }

    pub fn correlator(&self) -> &RpcCorrelator {
        &self.correlator
    }

    /// Applies one event. Only unrecoverable transport setup failures return `Err`.
    pub fn handle_event(&mut self, event: NodeEvent) -> Result<()> {
        match event {
            NodeEvent::Connected(peer) => self.on_connected(peer),
            NodeEvent::Closed(peer) => self.on_closed(&peer),
            NodeEvent::Packet(peer, envelope) => self.on_packet(&peer, envelope),
            NodeEvent::Listening(addr) => self.on_listening(addr),
            NodeEvent::DialFailed { addr, error } => return self.on_dial_failed(&addr, &error),
            NodeEvent::ListenFailed { addr, error } => {
                anyhow::bail!("Node {} cannot listen on {}: {}", self.name, addr, error);
            }
            NodeEvent::Command(command) => self.on_command(command),
        }

        Ok(())
    }

    pub fn on_connected(&mut self, peer: PeerHandle) {
        tracing::debug!("Connection {} up ({})", peer.id(), peer.remote_address());

        // The hub waits for the joining node to speak first.
        if self.hub.is_none() {
            peer.send(Envelope::RegisterRequest {
                unit_ids: self.units.ids(),
            });
        }

        self.connections.insert(peer.id(), peer);
    }

    pub fn on_closed(&mut self, peer: &PeerHandle) {
        self.connections.remove(&peer.id());

        let removed = self.directory.remove_peer(peer);
        if let Some(hub) = self.hub.as_mut() {
            hub.drop_waiters(peer);
        }

        tracing::info!(
            "Connection to {} closed ({} routes removed)",
            peer.remote_address(),
            removed
        );
    }

    pub fn on_packet(&mut self, peer: &PeerHandle, envelope: Envelope) {
        tracing::trace!("{:?} from {}", envelope.kind(), peer.remote_address());

        match envelope {
            Envelope::Error => {}
            Envelope::RegisterRequest { unit_ids } => self.on_register_request(peer, unit_ids),
            Envelope::RegisterResponse { port } => self.on_register_response(peer, port),
            Envelope::ImportRequest { dependency_ids } => {
                self.on_import_request(peer, dependency_ids)
            }
            Envelope::ImportResponse { sibling_addresses } => {
                self.on_import_response(peer, sibling_addresses)
            }
            Envelope::QueryRequest { unit_id } => self.on_query_request(peer, unit_id),
            Envelope::QueryResponse { node_address } => self.on_query_response(node_address),
            Envelope::RpcRequest(request) => self.on_rpc_request(peer, request),
            Envelope::RpcResponse(response) => self.on_rpc_response(response),
        }
    }

    fn on_register_request(&mut self, peer: &PeerHandle, unit_ids: Vec<String>) {
        tracing::info!(
            "{} registered {} unit(s): {:?}",
            peer.remote_address(),
            unit_ids.len(),
            unit_ids
        );

        self.directory.register(&unit_ids, peer);

        if let Some(hub) = self.hub.as_mut() {
            match hub.admit(peer, &unit_ids) {
                Ok(admission) => {
                    peer.send(Envelope::RegisterResponse {
                        port: admission.port,
                    });

                    if !self.units.is_empty() {
                        peer.send(Envelope::RegisterRequest {
                            unit_ids: self.units.ids(),
                        });
                    }

                    for (waiter, node_address) in admission.notify {
                        tracing::info!(
                            "Telling {} that {} is now available",
                            waiter.remote_address(),
                            node_address
                        );
                        waiter.send(Envelope::QueryResponse { node_address });
                    }

                    for (importer, sibling_addresses) in admission.imports {
                        tracing::info!(
                            "Releasing held import of {}: {} sibling(s)",
                            importer.remote_address(),
                            sibling_addresses.len()
                        );
                        importer.send(Envelope::ImportResponse { sibling_addresses });
                    }
                }
                Err(e) => {
                    tracing::error!("Cannot admit {}: {}", peer.remote_address(), e);
                    peer.send(Envelope::Error);
                }
            }
        }

        if self.joins.mark_joined(peer.remote_address()) {
            self.try_start();
        }
    }

    fn on_register_response(&mut self, peer: &PeerHandle, port: u16) {
        if self.startup.phase() != Phase::Joining {
            tracing::warn!(
                "Ignoring port assignment {} from {} in phase {:?}",
                port,
                peer.remote_address(),
                self.startup.phase()
            );
            return;
        }

        let listen_addr = format!("{}:{}", self.config.listen_host, port);
        tracing::info!("Hub assigned port {}; listening on {}", port, listen_addr);
        self.transport.listen(&listen_addr);

        self.units.init_all(&self.handle);
        self.startup.advance(Phase::Importing);

        peer.send(Envelope::ImportRequest {
            dependency_ids: self.units.depends(),
        });
    }

    fn on_import_request(&mut self, peer: &PeerHandle, dependency_ids: Vec<String>) {
        let Some(hub) = self.hub.as_mut() else {
            tracing::warn!("Ignoring import request from {}: not a hub", peer.remote_address());
            return;
        };

        let Some(sibling_addresses) = hub.resolve_imports(peer, &dependency_ids) else {
            return;
        };

        tracing::info!(
            "Resolved {} dependency id(s) for {} into {} sibling(s)",
            dependency_ids.len(),
            peer.remote_address(),
            sibling_addresses.len()
        );

        peer.send(Envelope::ImportResponse { sibling_addresses });
    }

    fn on_import_response(&mut self, peer: &PeerHandle, sibling_addresses: Vec<String>) {
        if self.startup.phase() != Phase::Importing {
            tracing::warn!(
                "Ignoring import response from {} in phase {:?}",
                peer.remote_address(),
                self.startup.phase()
            );
            return;
        }

        self.startup.advance(Phase::Connecting);

        if sibling_addresses.is_empty() {
            tracing::info!("No sibling nodes required");
            self.try_start();
            return;
        }

        tracing::info!("Connecting to {} sibling(s): {:?}", sibling_addresses.len(), sibling_addresses);

        self.joins.reset(&sibling_addresses);
        for addr in &sibling_addresses {
            self.transport.dial(addr);
        }
    }

    fn on_query_request(&mut self, peer: &PeerHandle, unit_id: String) {
        let Some(hub) = self.hub.as_mut() else {
            tracing::warn!("Ignoring query request from {}: not a hub", peer.remote_address());
            return;
        };

        match hub.query(peer, &unit_id) {
            QueryOutcome::Found(node_address) => {
                peer.send(Envelope::QueryResponse { node_address });
            }
            QueryOutcome::Local => {
                tracing::debug!("{} queried hub-owned unit {}", peer.remote_address(), unit_id);
            }
            QueryOutcome::Parked => {
                tracing::info!("{} waits for unit {}", peer.remote_address(), unit_id);
            }
        }
    }

    fn on_query_response(&mut self, node_address: String) {
        let connected = self
            .connections
            .values()
            .any(|peer| peer.remote_address() == node_address);

        if connected {
            tracing::debug!("Already connected to {}", node_address);
            return;
        }

        tracing::info!("Connecting to newly resolved node {}", node_address);
        self.transport.dial(&node_address);
    }

    fn on_rpc_request(&mut self, peer: &PeerHandle, request: RpcRequest) {
        let Some(unit) = self.units.get(&request.unit_id) else {
            tracing::warn!(
                "Dropping call {} from {}: no local unit {}",
                request.index,
                peer.remote_address(),
                request.unit_id
            );
            return;
        };

        let callee = unit.callee().clone();
        let peer = peer.clone();

        tokio::spawn(async move {
            let response = serve_rpc(callee, &request).await;
            peer.send(Envelope::RpcResponse(response));
        });
    }

    fn on_rpc_response(&mut self, response: RpcResponse) {
        let index = response.index;
        let unit_id = response.unit_id.clone();

        if !self.correlator.complete(index, response.into_reply()) {
            tracing::warn!("Ignoring response {} from {}: no pending call", index, unit_id);
        }
    }

    fn on_listening(&mut self, addr: SocketAddr) {
        self.listen_addr = Some(addr.to_string());
    }

    fn on_dial_failed(&mut self, addr: &str, error: &str) -> Result<()> {
        if self.hub_addr.as_deref() == Some(addr) && self.startup.phase() == Phase::Joining {
            anyhow::bail!("Node {} cannot reach hub {}: {}", self.name, addr, error);
        }

        tracing::warn!("Could not connect to {}: {}", addr, error);
        Ok(())
    }

    fn on_command(&mut self, command: NodeCommand) {
        match command {
            NodeCommand::Invoke {
                unit_id,
                method,
                args,
                with_result,
                callback,
            } => self.invoke(&unit_id, &method, args, with_result, callback),
            NodeCommand::Expire { index, timeout } => {
                self.correlator.expire(index, timeout);
            }
            NodeCommand::Status(reply) => {
                let _ = reply.send(self.status());
            }
            NodeCommand::Shutdown => {}
        }
    }

    /// Routes a call to a local unit directly, or to the peer that advertised it.
    fn invoke(
        &mut self,
        unit_id: &str,
        method: &str,
        args: Vec<Value>,
        with_result: bool,
        callback: RpcCallback,
    ) {
        if let Some(unit) = self.units.get(unit_id) {
            invoke_local(unit, method, args, with_result, callback);
            return;
        }

        let Some(peer) = self.directory.lookup(unit_id).cloned() else {
            tracing::warn!("Cannot call {}.{}: unit unknown", unit_id, method);
            callback(Err(RpcError::UnknownUnit(unit_id.to_string())));
            return;
        };

        match self
            .correlator
            .issue(&peer, unit_id, method, &args, with_result, callback)
        {
            Ok(index) => {
                if let Some(timeout) = self.config.rpc_timeout {
                    self.schedule_expiry(index, timeout);
                }
            }
            Err(e) => tracing::warn!("Failed to issue {}.{}: {}", unit_id, method, e),
        }
    }

    fn schedule_expiry(&self, index: CorrelationIndex, timeout: Duration) {
        let handle = self.handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            handle.expire(index, timeout);
        });
    }

    fn try_start(&mut self) {
        if self.startup.try_start(&self.joins) {
            tracing::info!("Node {} ready; starting {} unit(s)", self.name, self.units.len());
            self.units.start_all(&self.handle);
        }
    }

    pub fn status(&self) -> NodeStatus {
        let mut connections: Vec<String> = self
            .connections
            .values()
            .map(|peer| peer.remote_address().to_string())
            .collect();
        connections.sort();

        NodeStatus {
            name: self.name.clone(),
            role: self.role(),
            phase: self.startup.phase(),
            hub_address: self.hub_addr.clone(),
            listen_address: self.listen_addr.clone(),
            local_units: self.units.ids(),
            remote_units: self.directory.routes(),
            joins: self.joins.snapshot(),
            pending_rpcs: self.correlator.indices(),
            connections,
        }
    }
}

/// Runs an inbound call against a local unit and builds the reply.
///
/// Without `with_result` the method is started but not awaited, and the reply
/// carries no result.
async fn serve_rpc(callee: Arc<dyn Invocable>, request: &RpcRequest) -> RpcResponse {
    let args = match request.args() {
        Ok(args) => args,
        Err(e) => {
            tracing::warn!("Bad arguments for call {}: {}", request.index, e);
            return RpcResponse::for_request(request, Err(e));
        }
    };

    if !request.with_result {
        spawn_detached(callee.call(&request.method, args), &request.unit_id, &request.method);
        return RpcResponse::for_request(request, Ok(None));
    }

    let outcome = callee.call(&request.method, args).await;
    if let Err(e) = &outcome {
        tracing::warn!(
            "Call {} to {}.{} failed: {}",
            request.index,
            request.unit_id,
            request.method,
            e
        );
    }

    RpcResponse::for_request(request, outcome)
}

fn invoke_local(
    unit: &Unit,
    method: &str,
    args: Vec<Value>,
    with_result: bool,
    callback: RpcCallback,
) {
    let call = unit.callee().call(method, args);

    if !with_result {
        spawn_detached(call, unit.id(), method);
        callback(Ok(None));
        return;
    }

    tokio::spawn(async move {
        callback(call.await.map_err(|e| RpcError::Invocation(e.to_string())));
    });
}

fn spawn_detached(call: InvokeFuture, unit_id: &str, method: &str) {
    let target = format!("{}.{}", unit_id, method);
    tokio::spawn(async move {
        if let Err(e) = call.await {
            tracing::warn!("Call to {} failed: {}", target, e);
        }
    });
}
