//! Hub Directory Module
//!
//! The hub is an ordinary node that additionally acts as the cluster's directory:
//! it hands out listening ports to joining nodes, remembers which node owns which
//! unit id, and resolves dependency ids into sibling node addresses.
//!
//! An import naming ids nobody has registered yet is held until the last of them
//! shows up, so a joining node never starts ahead of its dependencies. Single-id
//! queries for unknown ids are parked and answered the same way.

pub mod directory;

#[cfg(test)]
mod tests;
