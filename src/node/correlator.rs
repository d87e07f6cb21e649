use crate::protocol::types::{CorrelationIndex, Envelope, RpcError, RpcReply, RpcRequest};
use crate::transport::peer::PeerHandle;

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Completion callback of an outbound call. Invoked at most once.
pub type RpcCallback = Box<dyn FnOnce(RpcReply) + Send + 'static>;

struct PendingCall {
    unit_id: String,
    method: String,
    callback: RpcCallback,
}

/// Pending outbound calls keyed by correlation index.
///
/// Indices come from a counter owned by this table, starting at 1, so they are unique
/// for the lifetime of the node. An entry leaves the table only when its response
/// arrives or when it is explicitly expired.
pub struct RpcCorrelator {
    next_index: CorrelationIndex,
    pending: HashMap<CorrelationIndex, PendingCall>,
}

impl RpcCorrelator {
    pub fn new() -> Self {
        Self {
            next_index: 1,
            pending: HashMap::new(),
        }
    }

    /// Records a pending call and sends the matching `RpcRequest` to `peer`.
    ///
    /// If the arguments cannot be encoded nothing is recorded and the callback
    /// receives the error.
    pub fn issue(
        &mut self,
        peer: &PeerHandle,
        unit_id: &str,
        method: &str,
        args: &[Value],
        with_result: bool,
        callback: RpcCallback,
    ) -> Result<CorrelationIndex> {
        let index = self.next_index;

        let request = match RpcRequest::new(index, unit_id, method, args, with_result) {
            Ok(request) => request,
            Err(e) => {
                callback(Err(RpcError::Decode(e.to_string())));
                return Err(e);
            }
        };

        self.next_index += 1;
        self.pending.insert(
            index,
            PendingCall {
                unit_id: unit_id.to_string(),
                method: method.to_string(),
                callback,
            },
        );

        tracing::debug!(
            "Issued call {} -> {}.{} via {}",
            index,
            unit_id,
            method,
            peer.remote_address()
        );

        if !peer.send(Envelope::RpcRequest(request)) {
            tracing::warn!("Call {} is pending on a closed connection", index);
        }

        Ok(index)
    }

    /// Completes the call registered under `index`. Unknown indices are ignored.
    pub fn complete(&mut self, index: CorrelationIndex, reply: RpcReply) -> bool {
        match self.pending.remove(&index) {
            Some(call) => {
                tracing::debug!("Completed call {} ({}.{})", index, call.unit_id, call.method);
                (call.callback)(reply);
                true
            }
            None => false,
        }
    }

    /// Removes a still-pending call and fails it with a timeout.
    pub fn expire(&mut self, index: CorrelationIndex, timeout: Duration) -> bool {
        match self.pending.remove(&index) {
            Some(call) => {
                tracing::warn!(
                    "Call {} ({}.{}) expired after {:?}",
                    index,
                    call.unit_id,
                    call.method,
                    timeout
                );
                (call.callback)(Err(RpcError::Timeout {
                    index,
                    timeout_ms: timeout.as_millis() as u64,
                }));
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, index: CorrelationIndex) -> bool {
        self.pending.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Outstanding indices in ascending order.
    pub fn indices(&self) -> Vec<CorrelationIndex> {
        let mut indices: Vec<_> = self.pending.keys().copied().collect();
        indices.sort_unstable();
        indices
    }
}

impl Default for RpcCorrelator {
    fn default() -> Self {
        Self::new()
    }
}
