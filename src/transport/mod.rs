//! Connection Transport Module
//!
//! Moves envelopes between nodes. The node never touches sockets directly: it asks a
//! `Transport` to dial or listen, and hears back through a `ConnectionHandler`.
//!
//! ## Submodules
//! - **`peer`**: `PeerHandle`, the non-owning send handle for one open connection.
//! - **`tcp`**: TCP implementation with length-prefixed frames and bounded dial retry.

pub mod peer;
pub mod tcp;

use crate::protocol::types::Envelope;
use peer::PeerHandle;

use std::net::SocketAddr;
use std::time::Duration;

/// Callbacks fired by a transport for every connection it opens or accepts.
///
/// Implementations must not block: the transport calls them from its I/O tasks.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn on_connected(&self, peer: PeerHandle);

    fn on_closed(&self, peer: PeerHandle);

    fn on_packet(&self, peer: PeerHandle, envelope: Envelope);

    /// A listener is bound and accepting.
    fn on_listening(&self, _addr: SocketAddr) {}

    /// A dial gave up after exhausting its retry policy.
    fn on_dial_failed(&self, _addr: &str, _error: String) {}

    /// A listener could not be bound.
    fn on_listen_failed(&self, _addr: &str, _error: String) {}
}

/// Fire-and-forget connection management. Outcomes arrive through the handler.
pub trait Transport: Send + Sync {
    fn dial(&self, addr: &str);

    fn listen(&self, addr: &str);
}

/// Bounded exponential backoff for outbound dials.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_millis(150),
            max_delay: Duration::from_millis(1200),
        }
    }
}

#[cfg(test)]
mod tests;
