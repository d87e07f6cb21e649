use crate::transport::peer::PeerHandle;

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

struct NodeRecord {
    port: u16,
    listen_addr: String,
}

/// An IMPORT_REQUEST held back until every id it names is registered.
struct PendingImport {
    peer: PeerHandle,
    dependency_ids: Vec<String>,
    missing: HashSet<String>,
}

/// Result of admitting a registering node.
pub struct Admission {
    pub port: u16,
    pub listen_addr: String,
    /// Waiters to notify with a `QueryResponse` carrying the given address.
    pub notify: Vec<(PeerHandle, String)>,
    /// Held imports this registration completed, with their sibling addresses.
    pub imports: Vec<(PeerHandle, Vec<String>)>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Owned by the node listening at this address.
    Found(String),
    /// Owned by the hub itself; the requester is already connected to it.
    Local,
    /// Not known yet; the requester will be notified.
    Parked,
}

pub struct HubDirectory {
    next_port: u32,
    local_units: HashSet<String>,
    /// Registering connection address -> assigned listener.
    nodes: HashMap<String, NodeRecord>,
    /// Unit id -> listen address of the owning node.
    units: HashMap<String, String>,
    waiters: HashMap<String, Vec<PeerHandle>>,
    pending_imports: Vec<PendingImport>,
}

impl HubDirectory {
    pub fn new(port_base: u16, local_units: HashSet<String>) -> Self {
        Self {
            next_port: port_base as u32,
            local_units,
            nodes: HashMap::new(),
            units: HashMap::new(),
            waiters: HashMap::new(),
            pending_imports: Vec::new(),
        }
    }

    /// Assigns (or re-reads) the port for `peer` and records its units.
    pub fn admit(&mut self, peer: &PeerHandle, unit_ids: &[String]) -> Result<Admission> {
        let remote = peer.remote_address().to_string();

        let (port, listen_addr) = match self.nodes.get(&remote) {
            Some(record) => (record.port, record.listen_addr.clone()),
            None => {
                if self.next_port > u16::MAX as u32 {
                    anyhow::bail!("No ports left to assign to {}", remote);
                }

                let port = self.next_port as u16;
                self.next_port += 1;

                let listen_addr = listen_address(&remote, port);
                tracing::info!("Assigned port {} to {} ({})", port, remote, listen_addr);

                self.nodes.insert(
                    remote.clone(),
                    NodeRecord {
                        port,
                        listen_addr: listen_addr.clone(),
                    },
                );
                (port, listen_addr)
            }
        };

        let mut notify: Vec<(PeerHandle, String)> = Vec::new();
        for id in unit_ids {
            if self.local_units.contains(id) {
                tracing::warn!("{} advertised {} which the hub owns; ignoring", remote, id);
                continue;
            }

            self.units.insert(id.clone(), listen_addr.clone());

            for waiter in self.waiters.remove(id).unwrap_or_default() {
                let duplicate = notify.iter().any(|(p, _)| p.id() == waiter.id());
                if waiter.id() != peer.id() && !duplicate {
                    notify.push((waiter, listen_addr.clone()));
                }
            }
        }

        let imports = self.release_imports(unit_ids);

        Ok(Admission {
            port,
            listen_addr,
            notify,
            imports,
        })
    }

    /// Resolves dependency ids into distinct sibling addresses, in first-seen order.
    ///
    /// Hub-owned ids and ids owned by the requester are skipped. If any id is not
    /// registered yet the request is held and `None` is returned; the answer is
    /// produced by the `admit` call that registers the last missing id.
    pub fn resolve_imports(
        &mut self,
        peer: &PeerHandle,
        dependency_ids: &[String],
    ) -> Option<Vec<String>> {
        let missing: HashSet<String> = dependency_ids
            .iter()
            .filter(|id| !self.local_units.contains(*id) && !self.units.contains_key(*id))
            .cloned()
            .collect();

        if missing.is_empty() {
            return Some(self.siblings_for(peer, dependency_ids));
        }

        tracing::info!(
            "Holding import of {} until {:?} register",
            peer.remote_address(),
            missing
        );

        self.pending_imports.retain(|pending| pending.peer.id() != peer.id());
        self.pending_imports.push(PendingImport {
            peer: peer.clone(),
            dependency_ids: dependency_ids.to_vec(),
            missing,
        });

        None
    }

    pub fn query(&mut self, peer: &PeerHandle, unit_id: &str) -> QueryOutcome {
        if self.local_units.contains(unit_id) {
            return QueryOutcome::Local;
        }

        match self.units.get(unit_id) {
            Some(addr) => QueryOutcome::Found(addr.clone()),
            None => {
                self.park(unit_id, peer);
                QueryOutcome::Parked
            }
        }
    }

    /// Forgets every wait and held import registered by `peer`.
    pub fn drop_waiters(&mut self, peer: &PeerHandle) {
        self.waiters.retain(|_, waiting| {
            waiting.retain(|w| w.id() != peer.id());
            !waiting.is_empty()
        });
        self.pending_imports
            .retain(|pending| pending.peer.id() != peer.id());
    }

    pub fn listen_address_of(&self, peer: &PeerHandle) -> Option<&str> {
        self.nodes
            .get(peer.remote_address())
            .map(|record| record.listen_addr.as_str())
    }

    pub fn unit_address(&self, unit_id: &str) -> Option<&str> {
        self.units.get(unit_id).map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn waiter_count(&self, unit_id: &str) -> usize {
        self.waiters.get(unit_id).map_or(0, Vec::len)
    }

    pub fn pending_import_count(&self) -> usize {
        self.pending_imports.len()
    }

    fn siblings_for(&self, peer: &PeerHandle, dependency_ids: &[String]) -> Vec<String> {
        let own_addr = self.listen_address_of(peer);
        let mut siblings: Vec<String> = Vec::new();

        for id in dependency_ids {
            if self.local_units.contains(id) {
                continue;
            }

            if let Some(addr) = self.units.get(id) {
                if Some(addr.as_str()) != own_addr && !siblings.contains(addr) {
                    siblings.push(addr.clone());
                }
            }
        }

        siblings
    }

    /// Ticks `registered` off every held import and answers the ones now complete.
    fn release_imports(&mut self, registered: &[String]) -> Vec<(PeerHandle, Vec<String>)> {
        let mut complete = Vec::new();

        self.pending_imports.retain_mut(|pending| {
            for id in registered {
                pending.missing.remove(id);
            }

            if pending.missing.is_empty() {
                complete.push((pending.peer.clone(), pending.dependency_ids.clone()));
                false
            } else {
                true
            }
        });

        complete
            .into_iter()
            .map(|(peer, dependency_ids)| {
                let siblings = self.siblings_for(&peer, &dependency_ids);
                (peer, siblings)
            })
            .collect()
    }

    fn park(&mut self, unit_id: &str, peer: &PeerHandle) {
        let waiting = self.waiters.entry(unit_id.to_string()).or_default();
        if !waiting.iter().any(|w| w.id() == peer.id()) {
            waiting.push(peer.clone());
        }
    }
}

/// Address a node will listen on: the host it connected from plus the assigned port.
fn listen_address(remote: &str, port: u16) -> String {
    match remote.parse::<SocketAddr>() {
        Ok(addr) => SocketAddr::new(addr.ip(), port).to_string(),
        Err(_) => {
            let host = remote.rsplit_once(':').map_or(remote, |(host, _)| host);
            format!("{}:{}", host, port)
        }
    }
}
