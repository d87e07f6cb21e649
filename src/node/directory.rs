use crate::transport::peer::PeerHandle;

use std::collections::{BTreeMap, HashMap};

/// Routes remote unit ids to the connection that advertised them.
///
/// Many ids can share one peer. The directory only borrows the routing role of a
/// connection and never closes it.
#[derive(Default)]
pub struct PeerDirectory {
    routes: HashMap<String, PeerHandle>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every id in `unit_ids` as reachable through `peer`, replacing older routes.
    pub fn register(&mut self, unit_ids: &[String], peer: &PeerHandle) {
        for id in unit_ids {
            self.routes.insert(id.clone(), peer.clone());
        }
    }

    pub fn lookup(&self, unit_id: &str) -> Option<&PeerHandle> {
        self.routes.get(unit_id)
    }

    /// Drops every route through `peer`. Returns how many were removed.
    pub fn remove_peer(&mut self, peer: &PeerHandle) -> usize {
        let before = self.routes.len();
        self.routes.retain(|_, routed| routed.id() != peer.id());
        before - self.routes.len()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Unit id -> remote address, sorted by id.
    pub fn routes(&self) -> BTreeMap<String, String> {
        self.routes
            .iter()
            .map(|(id, peer)| (id.clone(), peer.remote_address().to_string()))
            .collect()
    }
}

/// Per-address registration flags gating local startup.
///
/// Rebuilt wholesale by every dependency-resolution round. Only addresses named by
/// the latest round are tracked; registrations from anyone else leave it untouched.
#[derive(Default)]
pub struct JoinTracker {
    joined: HashMap<String, bool>,
}

impl JoinTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the map with `addrs`, all not yet joined.
    pub fn reset(&mut self, addrs: &[String]) {
        self.joined = addrs.iter().map(|addr| (addr.clone(), false)).collect();
    }

    /// Marks a tracked `addr` joined. Returns `true` only when this call changed the flag.
    pub fn mark_joined(&mut self, addr: &str) -> bool {
        match self.joined.get_mut(addr) {
            Some(flag) if !*flag => {
                *flag = true;
                true
            }
            _ => false,
        }
    }

    /// True when every tracked address has joined. An empty map is ready.
    pub fn all_joined(&self) -> bool {
        self.joined.values().all(|joined| *joined)
    }

    pub fn is_joined(&self, addr: &str) -> bool {
        self.joined.get(addr).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.joined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joined.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.joined
            .iter()
            .map(|(addr, joined)| (addr.clone(), *joined))
            .collect()
    }
}
