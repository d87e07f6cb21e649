use super::directory::JoinTracker;

use serde::{Deserialize, Serialize};

/// Lifecycle of a node, in order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Dialing the hub, waiting for a port.
    Joining,
    /// Listener open, waiting for dependency resolution.
    Importing,
    /// Siblings known; waiting for each of them to register.
    Connecting,
    Started,
}

/// Decides when local units may start. Starting happens at most once.
pub struct StartupSync {
    phase: Phase,
}

impl StartupSync {
    pub fn new() -> Self {
        Self {
            phase: Phase::Joining,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_started(&self) -> bool {
        self.phase == Phase::Started
    }

    /// Moves forward to `next`. Never moves backwards and never enters `Started`.
    pub fn advance(&mut self, next: Phase) -> bool {
        if next == Phase::Started || next <= self.phase {
            return false;
        }

        tracing::debug!("Phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
        true
    }

    /// Starts if the node is connecting and every tracked sibling has joined.
    /// Returns `true` exactly once, on the transition into `Started`.
    pub fn try_start(&mut self, joins: &JoinTracker) -> bool {
        if self.phase != Phase::Connecting || !joins.all_joined() {
            return false;
        }

        self.phase = Phase::Started;
        true
    }

    /// Starts unconditionally (hub bootstrap). Returns `false` if already started.
    pub fn force_start(&mut self) -> bool {
        if self.is_started() {
            return false;
        }

        self.phase = Phase::Started;
        true
    }
}

impl Default for StartupSync {
    fn default() -> Self {
        Self::new()
    }
}
