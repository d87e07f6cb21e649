//! Envelope Codecs & Framing
//!
//! Every connection is opened under a protocol tag; the tag selects the codec that
//! turns envelopes into bytes. Frames are a 4-byte big-endian length followed by the
//! encoded envelope.

use super::types::Envelope;

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default protocol tag. Selects the bincode codec.
pub const PROTOCOL_TAG: &str = "unite";
/// Protocol tag selecting the JSON codec (handy when sniffing traffic).
pub const PROTOCOL_TAG_JSON: &str = "unite-json";
/// Upper bound for a single frame.
pub const MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// Turns envelopes into bytes and back.
pub trait Codec: Send + Sync {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<Envelope>;
}

pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        Ok(bincode::serialize(envelope)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Envelope> {
        Ok(bincode::deserialize(bytes)?)
    }
}

pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(envelope)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Envelope> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Looks up the codec registered under `tag`.
pub fn codec_for_tag(tag: &str) -> Result<Arc<dyn Codec>> {
    match tag {
        PROTOCOL_TAG => Ok(Arc::new(BincodeCodec)),
        PROTOCOL_TAG_JSON => Ok(Arc::new(JsonCodec)),
        other => Err(anyhow::anyhow!("No codec registered for protocol tag '{}'", other)),
    }
}

/// Encodes `envelope` and writes it as one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, codec: &dyn Codec, envelope: &Envelope) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = codec.encode(envelope)?;
    if payload.len() > MAX_FRAME_BYTES {
        anyhow::bail!("Frame too large: {} bytes", payload.len());
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;

    Ok(())
}

/// Reads one frame. Returns `Ok(None)` on a clean end of stream.
///
/// A frame that fails to decode is returned as `Some(Err(..))` so the caller can
/// skip it and keep reading; I/O errors and oversized frames end the stream.
pub async fn read_frame<R>(reader: &mut R, codec: &dyn Codec) -> Result<Option<Result<Envelope>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_BYTES {
        anyhow::bail!("Frame too large: {} bytes", len);
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;

    Ok(Some(codec.decode(&buffer)))
}
