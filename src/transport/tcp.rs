//! TCP Transport
//!
//! Each connection gets a writer task draining the peer's outbound queue and a reader
//! task decoding frames in arrival order. Dials retry with exponential backoff and
//! jitter before reporting failure to the handler.

use super::peer::PeerHandle;
use super::{ConnectionHandler, RetryPolicy, Transport};
use crate::protocol::codec::{Codec, codec_for_tag, read_frame, write_frame};
use crate::protocol::types::Envelope;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

pub struct TcpTransport {
    codec: Arc<dyn Codec>,
    handler: Arc<dyn ConnectionHandler>,
    retry: RetryPolicy,
}

impl TcpTransport {
    /// Creates a transport whose connections speak the codec registered under `protocol_tag`.
    pub fn new(
        protocol_tag: &str,
        handler: Arc<dyn ConnectionHandler>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        Ok(Self {
            codec: codec_for_tag(protocol_tag)?,
            handler,
            retry,
        })
    }

    async fn dial_with_retry(
        addr: String,
        codec: Arc<dyn Codec>,
        handler: Arc<dyn ConnectionHandler>,
        retry: RetryPolicy,
    ) {
        let attempts = retry.attempts.max(1);
        let mut delay_ms = retry.initial_delay.as_millis() as u64;
        let max_delay_ms = retry.max_delay.as_millis() as u64;

        for attempt in 0..attempts {
            match TcpStream::connect(&addr).await {
                Ok(stream) => {
                    tracing::info!("Connected to {}", addr);
                    Self::spawn_connection(stream, addr, codec, handler);
                    return;
                }
                Err(e) => {
                    if attempt + 1 == attempts {
                        tracing::error!("Giving up on {} after {} attempts: {}", addr, attempts, e);
                        handler.on_dial_failed(&addr, e.to_string());
                        return;
                    }

                    tracing::debug!("Dial {} failed (attempt {}): {}", addr, attempt + 1, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(max_delay_ms);
                }
            }
        }
    }

    async fn accept_loop(
        listener: TcpListener,
        codec: Arc<dyn Codec>,
        handler: Arc<dyn ConnectionHandler>,
    ) {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    tracing::info!("Accepted connection from {}", peer_addr);
                    Self::spawn_connection(stream, peer_addr.to_string(), codec.clone(), handler.clone());
                }
                Err(e) => {
                    tracing::error!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    fn spawn_connection(
        stream: TcpStream,
        remote_addr: String,
        codec: Arc<dyn Codec>,
        handler: Arc<dyn ConnectionHandler>,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY for {}: {}", remote_addr, e);
        }

        let (read_half, write_half) = stream.into_split();
        let (peer, outbound) = PeerHandle::channel(&remote_addr);

        tokio::spawn(Self::writer_task(write_half, outbound, codec.clone(), remote_addr));

        handler.on_connected(peer.clone());

        tokio::spawn(async move {
            Self::reader_task(read_half, &peer, codec.as_ref(), handler.as_ref()).await;
            handler.on_closed(peer);
        });
    }

    async fn writer_task(
        mut write_half: OwnedWriteHalf,
        mut outbound: mpsc::UnboundedReceiver<Envelope>,
        codec: Arc<dyn Codec>,
        remote_addr: String,
    ) {
        while let Some(envelope) = outbound.recv().await {
            if let Err(e) = write_frame(&mut write_half, codec.as_ref(), &envelope).await {
                tracing::warn!("Failed to write {:?} to {}: {}", envelope.kind(), remote_addr, e);
                break;
            }
        }

        tracing::debug!("Writer for {} exiting", remote_addr);
    }

    async fn reader_task(
        mut read_half: OwnedReadHalf,
        peer: &PeerHandle,
        codec: &dyn Codec,
        handler: &dyn ConnectionHandler,
    ) {
        loop {
            match read_frame(&mut read_half, codec).await {
                Ok(Some(Ok(envelope))) => {
                    tracing::trace!("Received {:?} from {}", envelope.kind(), peer.remote_address());
                    handler.on_packet(peer.clone(), envelope);
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!("Failed to decode frame from {}: {}", peer.remote_address(), e);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Connection to {} failed: {}", peer.remote_address(), e);
                    break;
                }
            }
        }

        tracing::debug!("Reader for {} exiting", peer.remote_address());
    }
}

impl Transport for TcpTransport {
    fn dial(&self, addr: &str) {
        tokio::spawn(Self::dial_with_retry(
            addr.to_string(),
            self.codec.clone(),
            self.handler.clone(),
            self.retry.clone(),
        ));
    }

    fn listen(&self, addr: &str) {
        let addr = addr.to_string();
        let codec = self.codec.clone();
        let handler = self.handler.clone();

        tokio::spawn(async move {
            let listener = match TcpListener::bind(&addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!("Failed to listen on {}: {}", addr, e);
                    handler.on_listen_failed(&addr, e.to_string());
                    return;
                }
            };

            match listener.local_addr() {
                Ok(bound) => {
                    tracing::info!("Listening on {}", bound);
                    handler.on_listening(bound);
                }
                Err(e) => tracing::warn!("Listener on {} has no local address: {}", addr, e),
            }

            Self::accept_loop(listener, codec, handler).await;
        });
    }
}
