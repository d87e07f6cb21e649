//! Transport Module Tests
//!
//! ## Test Scopes
//! - **Peer Handles**: Identity and closed-queue behavior.
//! - **TCP**: Listen, dial, frame delivery, close notification and dial/listen failures
//!   against real loopback sockets.

#[cfg(test)]
mod tests {
    use crate::protocol::codec::{BincodeCodec, PROTOCOL_TAG, write_frame};
    use crate::protocol::types::Envelope;
    use crate::transport::peer::PeerHandle;
    use crate::transport::tcp::TcpTransport;
    use crate::transport::{ConnectionHandler, RetryPolicy, Transport};

    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;

    #[derive(Debug)]
    enum Recorded {
        Connected(PeerHandle),
        Closed(PeerHandle),
        Packet(PeerHandle, Envelope),
        Listening(SocketAddr),
        DialFailed(String),
        ListenFailed(String),
    }

    struct Recorder {
        events: mpsc::UnboundedSender<Recorded>,
    }

    impl ConnectionHandler for Recorder {
        fn on_connected(&self, peer: PeerHandle) {
            let _ = self.events.send(Recorded::Connected(peer));
        }

        fn on_closed(&self, peer: PeerHandle) {
            let _ = self.events.send(Recorded::Closed(peer));
        }

        fn on_packet(&self, peer: PeerHandle, envelope: Envelope) {
            let _ = self.events.send(Recorded::Packet(peer, envelope));
        }

        fn on_listening(&self, addr: SocketAddr) {
            let _ = self.events.send(Recorded::Listening(addr));
        }

        fn on_dial_failed(&self, addr: &str, _error: String) {
            let _ = self.events.send(Recorded::DialFailed(addr.to_string()));
        }

        fn on_listen_failed(&self, addr: &str, _error: String) {
            let _ = self.events.send(Recorded::ListenFailed(addr.to_string()));
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
        }
    }

    fn transport() -> (TcpTransport, mpsc::UnboundedReceiver<Recorded>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = TcpTransport::new(PROTOCOL_TAG, Arc::new(Recorder { events: tx }), fast_retry())
            .expect("default tag has a codec");
        (transport, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Recorded>) -> Recorded {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("recorder channel closed")
    }

    async fn listening(transport: &TcpTransport, rx: &mut mpsc::UnboundedReceiver<Recorded>) -> SocketAddr {
        transport.listen("127.0.0.1:0");
        match next(rx).await {
            Recorded::Listening(addr) => addr,
            other => panic!("Expected Listening, got {:?}", other),
        }
    }

    // ============================================================
    // PEER HANDLE TESTS
    // ============================================================

    #[test]
    fn test_peer_handles_have_distinct_ids() {
        let (a, _rx_a) = PeerHandle::channel("10.0.0.1:4000");
        let (b, _rx_b) = PeerHandle::channel("10.0.0.1:4000");

        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
        assert_eq!(a.remote_address(), "10.0.0.1:4000");
    }

    #[test]
    fn test_send_on_closed_peer_returns_false() {
        let (peer, rx) = PeerHandle::channel("10.0.0.2:4000");
        assert!(peer.send(Envelope::Error));

        drop(rx);
        assert!(peer.is_closed());
        assert!(!peer.send(Envelope::Error));
    }

    // ============================================================
    // TCP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_dial_and_exchange_envelopes() {
        let (server, mut server_rx) = transport();
        let (client, mut client_rx) = transport();

        let addr = listening(&server, &mut server_rx).await;
        client.dial(&addr.to_string());

        let client_peer = match next(&mut client_rx).await {
            Recorded::Connected(peer) => peer,
            other => panic!("Expected Connected on client, got {:?}", other),
        };
        assert_eq!(client_peer.remote_address(), addr.to_string());

        let server_peer = match next(&mut server_rx).await {
            Recorded::Connected(peer) => peer,
            other => panic!("Expected Connected on server, got {:?}", other),
        };

        let first = Envelope::RegisterRequest {
            unit_ids: vec!["b1".to_string()],
        };
        let second = Envelope::ImportRequest {
            dependency_ids: vec!["a1".to_string()],
        };
        assert!(client_peer.send(first.clone()));
        assert!(client_peer.send(second.clone()));

        match next(&mut server_rx).await {
            Recorded::Packet(peer, envelope) => {
                assert_eq!(peer, server_peer);
                assert_eq!(envelope, first);
            }
            other => panic!("Expected first packet, got {:?}", other),
        }
        match next(&mut server_rx).await {
            Recorded::Packet(_, envelope) => assert_eq!(envelope, second),
            other => panic!("Expected second packet, got {:?}", other),
        }

        assert!(server_peer.send(Envelope::RegisterResponse { port: 20000 }));
        match next(&mut client_rx).await {
            Recorded::Packet(peer, envelope) => {
                assert_eq!(peer, client_peer);
                assert_eq!(envelope, Envelope::RegisterResponse { port: 20000 });
            }
            other => panic!("Expected reply on client, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_connection_is_reported() {
        let (server, mut server_rx) = transport();
        let addr = listening(&server, &mut server_rx).await;

        let mut raw = TcpStream::connect(addr).await.unwrap();
        let accepted = match next(&mut server_rx).await {
            Recorded::Connected(peer) => peer,
            other => panic!("Expected Connected, got {:?}", other),
        };

        write_frame(&mut raw, &BincodeCodec, &Envelope::Error).await.unwrap();
        match next(&mut server_rx).await {
            Recorded::Packet(_, envelope) => assert_eq!(envelope, Envelope::Error),
            other => panic!("Expected packet, got {:?}", other),
        }

        drop(raw);
        match next(&mut server_rx).await {
            Recorded::Closed(peer) => assert_eq!(peer, accepted),
            other => panic!("Expected Closed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dial_failure_after_retries() {
        let unused = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = unused.local_addr().unwrap().to_string();
        drop(unused);

        let (client, mut client_rx) = transport();
        client.dial(&addr);

        match next(&mut client_rx).await {
            Recorded::DialFailed(failed) => assert_eq!(failed, addr),
            other => panic!("Expected DialFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_listen_failure_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let (server, mut server_rx) = transport();
        server.listen(&addr);

        match next(&mut server_rx).await {
            Recorded::ListenFailed(failed) => assert_eq!(failed, addr),
            other => panic!("Expected ListenFailed, got {:?}", other),
        }

        drop(taken);
    }

    #[test]
    fn test_unknown_protocol_tag_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = TcpTransport::new("carrier-pigeon", Arc::new(Recorder { events: tx }), fast_retry());
        assert!(result.is_err());
    }
}
