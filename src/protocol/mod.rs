//! Wire Protocol Module
//!
//! Defines the envelope catalog exchanged between nodes and the codecs used to
//! put envelopes on the wire.
//!
//! ## Layout
//! - **`types`**: The `Envelope` enum (one variant per message kind) and the RPC payloads.
//! - **`codec`**: Codec trait, bincode/JSON implementations, protocol-tag lookup and
//!   length-prefixed framing shared by every connection.

pub mod codec;
pub mod types;
