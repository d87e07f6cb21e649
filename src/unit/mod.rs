//! Local Unit Module
//!
//! Units are the addressable capabilities a node hosts. Each one has a globally unique
//! id, the ids it depends on, lifecycle hooks and an invocable object that exposes
//! named methods.
//!
//! ## Submodules
//! - **`types`**: `Unit`, the `UnitControl` hooks and the `UnitContext` passed to them.
//! - **`invoke`**: The `Invocable` capability and `MethodTable`, a name → closure table
//!   built at construction time.
//! - **`registry`**: `UnitRegistry`, the node's set of local units.

pub mod invoke;
pub mod registry;
pub mod types;
