//! Method Dispatch
//!
//! Units expose methods by name. Instead of reflection, each unit fills a
//! `MethodTable` with closures when it is built, and the node calls through the
//! `Invocable` trait.

use anyhow::Result;
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type InvokeFuture = Pin<Box<dyn Future<Output = Result<Option<Value>>> + Send>>;

/// Type alias for a thread-safe, asynchronous method implementation.
pub type MethodFn = Arc<dyn Fn(Vec<Value>) -> InvokeFuture + Send + Sync>;

/// Something that can be called by method name with positional arguments.
///
/// `Ok(None)` means the method produced no result; `Err` covers unknown methods
/// and failures inside the method.
pub trait Invocable: Send + Sync {
    fn call(&self, method: &str, args: Vec<Value>) -> InvokeFuture;
}

/// Name → closure table implementing `Invocable`.
pub struct MethodTable {
    methods: DashMap<String, MethodFn>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self {
            methods: DashMap::new(),
        }
    }

    /// Registers `method` under `name`, replacing any previous entry.
    pub fn register<F, Fut>(&self, name: &str, method: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
    {
        let method_fn: MethodFn =
            Arc::new(move |args: Vec<Value>| Box::pin(method(args)) as InvokeFuture);

        self.methods.insert(name.to_string(), method_fn);

        tracing::debug!("Registered method: {}", name);
    }

    /// Builder form of `register`.
    pub fn with<F, Fut>(self, name: &str, method: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
    {
        self.register(name, method);
        self
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn into_invocable(self) -> Arc<dyn Invocable> {
        Arc::new(self)
    }
}

impl Default for MethodTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Invocable for MethodTable {
    fn call(&self, method: &str, args: Vec<Value>) -> InvokeFuture {
        // Clone out of the map so the shard lock is not held across the await.
        match self.methods.get(method).map(|entry| entry.value().clone()) {
            Some(method_fn) => method_fn(args),
            None => {
                let error = format!("Unknown method: {}", method);
                Box::pin(async move { Err(anyhow::anyhow!(error)) })
            }
        }
    }
}
