//! Hub Module Tests
//!
//! ## Test Scopes
//! - **Admission**: Port assignment and listen address derivation.
//! - **Resolution**: IMPORT filtering, de-duplication and holding of unknown ids.
//! - **Queries**: Single-id lookups and waiter notification.

#[cfg(test)]
mod tests {
    use crate::hub::directory::{HubDirectory, QueryOutcome};
    use crate::transport::peer::PeerHandle;

    use std::collections::HashSet;

    fn hub(local: &[&str]) -> HubDirectory {
        let local: HashSet<String> = local.iter().map(|id| id.to_string()).collect();
        HubDirectory::new(20000, local)
    }

    fn peer(addr: &str) -> PeerHandle {
        PeerHandle::channel(addr).0
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    // ============================================================
    // ADMISSION TESTS
    // ============================================================

    #[test]
    fn test_ports_assigned_in_order() {
        let mut hub = hub(&["a1"]);
        let b = peer("10.0.0.2:51000");
        let c = peer("10.0.0.3:51000");

        let first = hub.admit(&b, &ids(&["b1"])).unwrap();
        let second = hub.admit(&c, &ids(&["c1"])).unwrap();

        assert_eq!(first.port, 20000);
        assert_eq!(first.listen_addr, "10.0.0.2:20000");
        assert_eq!(second.port, 20001);
        assert_eq!(second.listen_addr, "10.0.0.3:20001");
        assert_eq!(hub.node_count(), 2);
    }

    #[test]
    fn test_reregistration_keeps_port() {
        let mut hub = hub(&[]);
        let b = peer("10.0.0.2:51000");

        let first = hub.admit(&b, &ids(&["b1"])).unwrap();
        let again = hub.admit(&b, &ids(&["b1", "b2"])).unwrap();

        assert_eq!(first.port, again.port);
        assert_eq!(hub.node_count(), 1);
        assert_eq!(hub.unit_address("b2"), Some("10.0.0.2:20000"));
    }

    #[test]
    fn test_hub_owned_ids_not_overwritten() {
        let mut hub = hub(&["a1"]);
        let b = peer("10.0.0.2:51000");

        hub.admit(&b, &ids(&["a1", "b1"])).unwrap();

        assert_eq!(hub.unit_address("a1"), None);
        assert_eq!(hub.unit_address("b1"), Some("10.0.0.2:20000"));
    }

    #[test]
    fn test_port_space_exhaustion() {
        let mut hub = HubDirectory::new(u16::MAX, HashSet::new());

        assert_eq!(hub.admit(&peer("10.0.0.2:1"), &ids(&["b1"])).unwrap().port, u16::MAX);
        assert!(hub.admit(&peer("10.0.0.3:1"), &ids(&["c1"])).is_err());
    }

    // ============================================================
    // RESOLUTION TESTS
    // ============================================================

    #[test]
    fn test_import_skips_hub_and_requester_units() {
        let mut hub = hub(&["a1"]);
        let b = peer("10.0.0.2:51000");
        let c = peer("10.0.0.3:51000");

        hub.admit(&b, &ids(&["b1", "b2"])).unwrap();
        hub.admit(&c, &ids(&["c1"])).unwrap();

        let siblings = hub.resolve_imports(&b, &ids(&["a1", "b2", "c1"]));
        assert_eq!(siblings, Some(vec!["10.0.0.3:20001".to_string()]));
    }

    #[test]
    fn test_import_deduplicates_addresses() {
        let mut hub = hub(&[]);
        let b = peer("10.0.0.2:51000");
        let c = peer("10.0.0.3:51000");

        hub.admit(&b, &ids(&["b1"])).unwrap();
        hub.admit(&c, &ids(&["c1", "c2"])).unwrap();

        let siblings = hub.resolve_imports(&b, &ids(&["c1", "c2", "c1"]));
        assert_eq!(siblings, Some(vec!["10.0.0.3:20001".to_string()]));
    }

    #[test]
    fn test_hub_only_import_answered_immediately() {
        let mut hub = hub(&["a1"]);
        let b = peer("10.0.0.2:51000");

        hub.admit(&b, &ids(&["b1"])).unwrap();

        assert_eq!(hub.resolve_imports(&b, &ids(&["a1"])), Some(vec![]));
        assert_eq!(hub.pending_import_count(), 0);
    }

    #[test]
    fn test_unknown_import_held_until_registered() {
        let mut hub = hub(&[]);
        let b = peer("10.0.0.2:51000");
        let c = peer("10.0.0.3:51000");

        hub.admit(&b, &ids(&["b1"])).unwrap();

        assert_eq!(hub.resolve_imports(&b, &ids(&["c1", "c1"])), None);
        assert_eq!(hub.pending_import_count(), 1);
        assert_eq!(hub.waiter_count("c1"), 0);

        let admission = hub.admit(&c, &ids(&["c1"])).unwrap();
        assert!(admission.notify.is_empty());
        assert_eq!(admission.imports.len(), 1);
        assert_eq!(admission.imports[0].0, b);
        assert_eq!(admission.imports[0].1, vec!["10.0.0.3:20001".to_string()]);
        assert_eq!(hub.pending_import_count(), 0);
    }

    #[test]
    fn test_held_import_waits_for_every_id() {
        let mut hub = hub(&["a1"]);
        let b = peer("10.0.0.2:51000");
        let c = peer("10.0.0.3:51000");
        let d = peer("10.0.0.4:51000");

        hub.admit(&b, &ids(&["b1"])).unwrap();
        assert_eq!(hub.resolve_imports(&b, &ids(&["a1", "c1", "d1"])), None);

        let first = hub.admit(&c, &ids(&["c1"])).unwrap();
        assert!(first.imports.is_empty());
        assert_eq!(hub.pending_import_count(), 1);

        let second = hub.admit(&d, &ids(&["d1"])).unwrap();
        assert_eq!(second.imports.len(), 1);
        assert_eq!(
            second.imports[0].1,
            vec!["10.0.0.3:20001".to_string(), "10.0.0.4:20002".to_string()]
        );
    }

    #[test]
    fn test_repeated_import_replaces_held_one() {
        let mut hub = hub(&[]);
        let b = peer("10.0.0.2:51000");

        hub.admit(&b, &ids(&["b1"])).unwrap();
        hub.resolve_imports(&b, &ids(&["c1"]));
        hub.resolve_imports(&b, &ids(&["c1", "c2"]));

        assert_eq!(hub.pending_import_count(), 1);
    }

    #[test]
    fn test_closed_peer_is_forgotten() {
        let mut hub = hub(&[]);
        let b = peer("10.0.0.2:51000");

        hub.admit(&b, &ids(&["b1"])).unwrap();
        hub.resolve_imports(&b, &ids(&["c1"]));
        hub.query(&b, "c1");
        hub.drop_waiters(&b);

        assert_eq!(hub.waiter_count("c1"), 0);
        assert_eq!(hub.pending_import_count(), 0);

        let admission = hub.admit(&peer("10.0.0.3:51000"), &ids(&["c1"])).unwrap();
        assert!(admission.notify.is_empty());
        assert!(admission.imports.is_empty());
    }

    // ============================================================
    // QUERY TESTS
    // ============================================================

    #[test]
    fn test_query_outcomes() {
        let mut hub = hub(&["a1"]);
        let b = peer("10.0.0.2:51000");
        let c = peer("10.0.0.3:51000");

        hub.admit(&c, &ids(&["c1"])).unwrap();

        assert_eq!(hub.query(&b, "a1"), QueryOutcome::Local);
        assert_eq!(hub.query(&b, "c1"), QueryOutcome::Found("10.0.0.3:20000".to_string()));
        assert_eq!(hub.query(&b, "z9"), QueryOutcome::Parked);
        assert_eq!(hub.waiter_count("z9"), 1);
    }

    #[test]
    fn test_waiter_notified_once_for_several_ids() {
        let mut hub = hub(&[]);
        let b = peer("10.0.0.2:51000");
        let c = peer("10.0.0.3:51000");

        hub.admit(&b, &ids(&["b1"])).unwrap();
        assert_eq!(hub.query(&b, "c1"), QueryOutcome::Parked);
        assert_eq!(hub.query(&b, "c2"), QueryOutcome::Parked);

        let admission = hub.admit(&c, &ids(&["c1", "c2"])).unwrap();
        assert_eq!(admission.notify.len(), 1);
        assert_eq!(admission.notify[0].1, "10.0.0.3:20001");
    }

    #[test]
    fn test_listen_address_of_registered_peer() {
        let mut hub = hub(&[]);
        let b = peer("[::1]:51000");

        assert!(hub.listen_address_of(&b).is_none());
        hub.admit(&b, &ids(&["b1"])).unwrap();
        assert_eq!(hub.listen_address_of(&b), Some("[::1]:20000"));
    }
}
