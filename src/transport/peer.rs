use crate::protocol::types::Envelope;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

/// Send handle for one open connection.
///
/// Cloning is cheap and every clone feeds the same writer. The node keeps these
/// for routing only; the connection itself belongs to the transport.
#[derive(Clone)]
pub struct PeerHandle {
    id: u64,
    remote_addr: String,
    outbound: mpsc::UnboundedSender<Envelope>,
}

impl PeerHandle {
    pub fn new(remote_addr: &str, outbound: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            id: NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed),
            remote_addr: remote_addr.to_string(),
            outbound,
        }
    }

    /// Creates a handle together with the receiving end of its outbound queue.
    pub fn channel(remote_addr: &str) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(remote_addr, tx), rx)
    }

    /// Process-unique id of the underlying connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn remote_address(&self) -> &str {
        &self.remote_addr
    }

    /// Queues `envelope` for the writer. Returns `false` if the connection is gone.
    pub fn send(&self, envelope: Envelope) -> bool {
        let kind = envelope.kind();
        match self.outbound.send(envelope) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("Dropped {:?} to {}: connection closed", kind, self.remote_addr);
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

impl PartialEq for PeerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeerHandle {}
