//! Cluster Bootstrap & Remote Dispatch Library
//!
//! Lets independently deployed units find each other, wait for their dependencies,
//! and call each other's methods whether they live in this process or another one.
//!
//! ## Architecture Modules
//! - **`node`**: The coordination protocol. Joins through a hub, resolves dependencies
//!   into sibling nodes, gates startup on their registration and correlates RPCs.
//! - **`hub`**: Directory role of the hub node: port assignment and dependency resolution.
//! - **`unit`**: Local units, their lifecycle hooks and name-based method dispatch.
//! - **`protocol`**: The envelope catalog, codecs and framing.
//! - **`transport`**: Connection handling (TCP) behind the `Transport` seam.
//! - **`status`**: JSON status endpoint over HTTP.
//! - **`cli`**: Flag parsing for the `unite` binary.

pub mod cli;
pub mod hub;
pub mod node;
pub mod protocol;
pub mod status;
pub mod transport;
pub mod unit;
