//! Compiled-in code that unit files refer to by name.
//!
//! Unit files are data; the callable parts (executors, event listeners,
//! per-target descriptor builders, constructible units) are registered
//! here once at startup and looked up while normalizing a loaded unit.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::descriptor::{CommandDescriptor, DescriptorFn, DescriptorSource};
use super::CommandExecutor;
use crate::client::Client;
use crate::dispatch::Invocation;
use crate::events::EventContext;
use crate::platform::TargetContext;

/// A command executor.
pub type ExecutorFn = Arc<dyn Fn(Invocation) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// An event listener.
pub type ListenerFn =
    Arc<dyn Fn(EventContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Instantiates a constructible unit with the owner client.
pub type UnitFactory = Arc<dyn Fn(&Client) -> Arc<dyn CommandUnit> + Send + Sync>;

/// A command implemented as a Rust type.
///
/// Registered either as a factory (a fresh value per load) or as a shared
/// instance.
pub trait CommandUnit: Send + Sync {
    /// The descriptor, static or per target.
    fn build(&self) -> DescriptorSource;

    /// The executor tree for this unit.
    fn executor(self: Arc<Self>) -> CommandExecutor;
}

/// Wrap an async closure as an [`ExecutorFn`].
pub fn executor<F, Fut>(f: F) -> ExecutorFn
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |invocation| Box::pin(f(invocation)))
}

/// Wrap an async closure as a [`ListenerFn`].
pub fn listener<F, Fut>(f: F) -> ListenerFn
where
    F: Fn(EventContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Named callables available to unit files.
#[derive(Default, Clone)]
pub struct Bindings {
    executors: HashMap<String, ExecutorFn>,
    listeners: HashMap<String, ListenerFn>,
    builders: HashMap<String, DescriptorFn>,
    factories: HashMap<String, UnitFactory>,
    instances: HashMap<String, Arc<dyn CommandUnit>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executor<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.executors.insert(name.into(), executor(f));
        self
    }

    pub fn with_listener<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.listeners.insert(name.into(), listener(f));
        self
    }

    pub fn with_builder<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&TargetContext) -> Option<CommandDescriptor> + Send + Sync + 'static,
    {
        self.builders.insert(name.into(), Arc::new(f));
        self
    }

    pub fn with_factory<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Client) -> Arc<dyn CommandUnit> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(f));
        self
    }

    pub fn with_instance(mut self, name: impl Into<String>, unit: Arc<dyn CommandUnit>) -> Self {
        self.instances.insert(name.into(), unit);
        self
    }

    pub fn executor(&self, name: &str) -> Option<&ExecutorFn> {
        self.executors.get(name)
    }

    pub fn listener(&self, name: &str) -> Option<&ListenerFn> {
        self.listeners.get(name)
    }

    pub fn builder(&self, name: &str) -> Option<&DescriptorFn> {
        self.builders.get(name)
    }

    pub fn factory(&self, name: &str) -> Option<&UnitFactory> {
        self.factories.get(name)
    }

    pub fn instance(&self, name: &str) -> Option<&Arc<dyn CommandUnit>> {
        self.instances.get(name)
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn sorted<V>(map: &HashMap<String, V>) -> Vec<&str> {
            let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
            keys.sort_unstable();
            keys
        }

        f.debug_struct("Bindings")
            .field("executors", &sorted(&self.executors))
            .field("listeners", &sorted(&self.listeners))
            .field("builders", &sorted(&self.builders))
            .field("factories", &sorted(&self.factories))
            .field("instances", &sorted(&self.instances))
            .finish()
    }
}
