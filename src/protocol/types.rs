use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Correlation index pairing an outbound call with its response.
pub type CorrelationIndex = i64;

/// Discriminant of an `Envelope`, used for logging and status reporting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Error,
    RegisterRequest,
    RegisterResponse,
    ImportRequest,
    ImportResponse,
    QueryRequest,
    QueryResponse,
    RpcRequest,
    RpcResponse,
}

/// The wire protocol between nodes.
///
/// - `RegisterRequest/RegisterResponse`: A node advertises its units; the hub answers with a port.
/// - `ImportRequest/ImportResponse`: Dependency ids are resolved into sibling node addresses.
/// - `QueryRequest/QueryResponse`: Single unit id lookup, also pushed by the hub when a
///   previously unknown dependency shows up.
/// - `RpcRequest/RpcResponse`: Method calls routed to units on other nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Envelope {
    Error,

    RegisterRequest {
        unit_ids: Vec<String>,
    },

    RegisterResponse {
        port: u16,
    },

    ImportRequest {
        dependency_ids: Vec<String>,
    },

    ImportResponse {
        sibling_addresses: Vec<String>,
    },

    QueryRequest {
        unit_id: String,
    },

    QueryResponse {
        node_address: String,
    },

    RpcRequest(RpcRequest),

    RpcResponse(RpcResponse),
}

impl Envelope {
    pub fn kind(&self) -> MessageKind {
        match self {
            Envelope::Error => MessageKind::Error,
            Envelope::RegisterRequest { .. } => MessageKind::RegisterRequest,
            Envelope::RegisterResponse { .. } => MessageKind::RegisterResponse,
            Envelope::ImportRequest { .. } => MessageKind::ImportRequest,
            Envelope::ImportResponse { .. } => MessageKind::ImportResponse,
            Envelope::QueryRequest { .. } => MessageKind::QueryRequest,
            Envelope::QueryResponse { .. } => MessageKind::QueryResponse,
            Envelope::RpcRequest(_) => MessageKind::RpcRequest,
            Envelope::RpcResponse(_) => MessageKind::RpcResponse,
        }
    }
}

/// A method call addressed to a unit on the receiving node.
///
/// Arguments are carried as a JSON array string so that arbitrary values survive
/// the binary envelope codec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub index: CorrelationIndex,
    pub unit_id: String,
    pub method: String,
    pub args_json: String,
    pub with_result: bool,
}

impl RpcRequest {
    pub fn new(
        index: CorrelationIndex,
        unit_id: &str,
        method: &str,
        args: &[Value],
        with_result: bool,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            index,
            unit_id: unit_id.to_string(),
            method: method.to_string(),
            args_json: serde_json::to_string(args)?,
            with_result,
        })
    }

    pub fn args(&self) -> anyhow::Result<Vec<Value>> {
        Ok(serde_json::from_str(&self.args_json)?)
    }
}

/// Reply to an `RpcRequest`, echoing its index, unit id and method.
///
/// `result_json` is absent when no result was requested or the method returned nothing.
/// `error` is set when the invocation failed on the target node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    pub index: CorrelationIndex,
    pub unit_id: String,
    pub method: String,
    pub result_json: Option<String>,
    pub error: Option<String>,
}

impl RpcResponse {
    /// Builds the response for `request` from the outcome of the local invocation.
    pub fn for_request(request: &RpcRequest, outcome: anyhow::Result<Option<Value>>) -> Self {
        let (result_json, error) = match outcome {
            Ok(Some(value)) => match serde_json::to_string(&value) {
                Ok(json) => (Some(json), None),
                Err(e) => (None, Some(format!("Failed to encode result: {}", e))),
            },
            Ok(None) => (None, None),
            Err(e) => (None, Some(e.to_string())),
        };

        Self {
            index: request.index,
            unit_id: request.unit_id.clone(),
            method: request.method.clone(),
            result_json,
            error,
        }
    }

    /// Converts the wire form into what the caller's callback receives.
    pub fn into_reply(self) -> RpcReply {
        if let Some(error) = self.error {
            return Err(RpcError::Invocation(error));
        }

        match self.result_json {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| RpcError::Decode(e.to_string())),
            None => Ok(None),
        }
    }
}

/// Why a call did not produce a result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    /// The method ran and failed, or does not exist on the target unit.
    #[error("invocation failed: {0}")]
    Invocation(String),

    /// The unit id is neither local nor known in the peer directory.
    #[error("unit {0} is not reachable from this node")]
    UnknownUnit(String),

    /// Opt-in expiry fired before a response arrived.
    #[error("call {index} timed out after {timeout_ms}ms")]
    Timeout {
        index: CorrelationIndex,
        timeout_ms: u64,
    },

    /// The result could not be decoded.
    #[error("failed to decode result: {0}")]
    Decode(String),

    /// The node's event loop is gone.
    #[error("node stopped")]
    NodeStopped,
}

/// Outcome delivered to a call's completion callback.
pub type RpcReply = Result<Option<Value>, RpcError>;
