use super::correlator::RpcCallback;
use super::startup::Phase;
use crate::protocol::codec::PROTOCOL_TAG;
use crate::protocol::types::{CorrelationIndex, Envelope};
use crate::transport::RetryPolicy;
use crate::transport::peer::PeerHandle;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::oneshot;

/// Default first port the hub hands out to joining nodes.
pub const DEFAULT_HUB_PORT_BASE: u16 = 20000;

/// Generates a random node name for when the operator does not supply one.
pub fn default_node_name() -> String {
    format!("node-{}", uuid::Uuid::new_v4())
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Protocol tag selecting the codec for every connection.
    pub protocol_tag: String,
    /// Host part of the listener opened after the hub assigns a port.
    pub listen_host: String,
    /// First port handed out when this node acts as hub.
    pub hub_port_base: u16,
    /// Expiry for outbound calls. `None` waits forever.
    pub rpc_timeout: Option<Duration>,
    pub dial_retry: RetryPolicy,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            protocol_tag: PROTOCOL_TAG.to_string(),
            listen_host: "0.0.0.0".to_string(),
            hub_port_base: DEFAULT_HUB_PORT_BASE,
            rpc_timeout: None,
            dial_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeRole {
    Node,
    Hub,
}

/// Point-in-time view of a node, served by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub name: String,
    pub role: NodeRole,
    pub phase: Phase,
    pub hub_address: Option<String>,
    pub listen_address: Option<String>,
    pub local_units: Vec<String>,
    /// Remote unit id -> address of the connection that advertised it.
    pub remote_units: BTreeMap<String, String>,
    pub joins: BTreeMap<String, bool>,
    pub pending_rpcs: Vec<CorrelationIndex>,
    pub connections: Vec<String>,
}

/// Everything the coordinating task reacts to.
pub enum NodeEvent {
    Connected(PeerHandle),
    Closed(PeerHandle),
    Packet(PeerHandle, Envelope),
    Listening(SocketAddr),
    DialFailed { addr: String, error: String },
    ListenFailed { addr: String, error: String },
    Command(NodeCommand),
}

/// Requests issued through a `NodeHandle`.
pub enum NodeCommand {
    Invoke {
        unit_id: String,
        method: String,
        args: Vec<Value>,
        with_result: bool,
        callback: RpcCallback,
    },
    Expire {
        index: CorrelationIndex,
        timeout: Duration,
    },
    Status(oneshot::Sender<NodeStatus>),
    Shutdown,
}
