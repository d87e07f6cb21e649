use super::invoke::Invocable;
use crate::node::service::NodeHandle;

use std::fmt;
use std::sync::Arc;

/// Handed to lifecycle hooks so a unit can reach the rest of the cluster.
#[derive(Clone)]
pub struct UnitContext {
    pub unit_id: String,
    pub node: NodeHandle,
}

/// Lifecycle hooks of a unit.
///
/// Both hooks run on the node's coordinating task: they must return quickly and
/// spawn any work that needs to await a call.
pub trait UnitControl: Send + Sync {
    /// Runs once the node has been assigned a port, before dependencies are resolved.
    fn on_init(&self, _ctx: &UnitContext) {}

    /// Runs exactly once, after every dependency node has completed registration.
    fn on_start(&self, _ctx: &UnitContext) {}
}

/// Hooks that do nothing.
pub struct NoopControl;

impl UnitControl for NoopControl {}

/// A local capability hosted by exactly one node.
#[derive(Clone)]
pub struct Unit {
    id: String,
    depends: Vec<String>,
    control: Arc<dyn UnitControl>,
    callee: Arc<dyn Invocable>,
}

impl Unit {
    pub fn new(id: &str, callee: Arc<dyn Invocable>) -> Self {
        Self {
            id: id.to_string(),
            depends: Vec::new(),
            control: Arc::new(NoopControl),
            callee,
        }
    }

    /// Declares the unit ids that must be reachable before this unit starts.
    pub fn with_depends<I, S>(mut self, depends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends = depends.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_control(mut self, control: Arc<dyn UnitControl>) -> Self {
        self.control = control;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn depends(&self) -> &[String] {
        &self.depends
    }

    pub fn control(&self) -> &Arc<dyn UnitControl> {
        &self.control
    }

    pub fn callee(&self) -> &Arc<dyn Invocable> {
        &self.callee
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("id", &self.id)
            .field("depends", &self.depends)
            .finish()
    }
}
