use super::types::{Unit, UnitContext};
use crate::node::service::NodeHandle;

use anyhow::Result;
use std::collections::{BTreeMap, HashSet};

/// The node's local units, keyed by id.
///
/// Backed by an ordered map so hooks run in the same (id) order on every run.
pub struct UnitRegistry {
    units: BTreeMap<String, Unit>,
}

impl UnitRegistry {
    /// Builds the registry, rejecting duplicate unit ids.
    pub fn new(units: Vec<Unit>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for unit in units {
            let id = unit.id().to_string();
            if map.insert(id.clone(), unit).is_some() {
                anyhow::bail!("Duplicate unit id: {}", id);
            }
        }

        Ok(Self { units: map })
    }

    pub fn get(&self, id: &str) -> Option<&Unit> {
        self.units.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.units.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Every local unit id.
    pub fn collect(&self) -> HashSet<String> {
        self.units.keys().cloned().collect()
    }

    /// Local unit ids in registry order, for wire payloads.
    pub fn ids(&self) -> Vec<String> {
        self.units.keys().cloned().collect()
    }

    /// Concatenation of every unit's dependency ids. Duplicates across units are kept.
    pub fn depends(&self) -> Vec<String> {
        self.units
            .values()
            .flat_map(|unit| unit.depends().iter().cloned())
            .collect()
    }

    pub fn init_all(&self, node: &NodeHandle) {
        for unit in self.units.values() {
            tracing::debug!("Initializing unit {}", unit.id());
            unit.control().on_init(&Self::context(unit, node));
        }
    }

    pub fn start_all(&self, node: &NodeHandle) {
        for unit in self.units.values() {
            tracing::info!("Starting unit {}", unit.id());
            unit.control().on_start(&Self::context(unit, node));
        }
    }

    fn context(unit: &Unit, node: &NodeHandle) -> UnitContext {
        UnitContext {
            unit_id: unit.id().to_string(),
            node: node.clone(),
        }
    }
}
