//! Node Coordination Module
//!
//! Implements the node side of the cluster protocol: joining through a hub, resolving
//! dependencies into sibling nodes, gating local startup on their registration, and
//! routing method calls to local or remote units.
//!
//! ## Core Mechanisms
//! - **Single Coordinating Task**: Every transport callback and local command is queued
//!   into one channel and applied by `NodeService` in order. Directory, join map and
//!   pending calls are only ever touched from that task.
//! - **Phased Startup**: `Joining -> Importing -> Connecting -> Started`. Readiness is only
//!   evaluated while `Connecting`, and the switch to `Started` happens in the same step
//!   that runs `OnStart`.
//! - **Correlated RPC**: Outbound calls get a node-owned monotonic index; the matching
//!   response completes the call exactly once.
//!
//! ## Submodules
//! - **`types`**: Configuration, events, commands and the status snapshot.
//! - **`directory`**: Peer Directory (unit id -> connection) and join tracking.
//! - **`correlator`**: Pending-call table.
//! - **`startup`**: Lifecycle phase and readiness check.
//! - **`union`**: The protocol state machine.
//! - **`service`**: Event loop, `NodeHandle` and the transport callback adapter.

pub mod correlator;
pub mod directory;
pub mod service;
pub mod startup;
pub mod types;
pub mod union;
