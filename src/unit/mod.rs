//! Canonical handler records.
//!
//! Whatever shape a unit file was authored in, the normalizer reduces it to
//! one of the records below. Everything downstream of the loader (registry,
//! synchronizer, dispatcher) only ever sees these.

pub mod bindings;
pub mod descriptor;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub use bindings::{
    Bindings, CommandUnit, ExecutorFn, ListenerFn, UnitFactory, executor, listener,
};
pub use descriptor::{
    CommandDescriptor, CommandOption, CommandType, DescriptorFn, DescriptorSource, OptionChoice,
    OptionType,
};

/// The two partitions of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandlerKind {
    Command,
    Event,
}

impl HandlerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HandlerKind::Command => "command",
            HandlerKind::Event => "event",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One level of a nested executor map.
#[derive(Clone)]
pub enum ExecutorNode {
    Function(ExecutorFn),
    Map(BTreeMap<String, ExecutorFn>),
}

/// What runs when a command is invoked.
#[derive(Clone)]
pub enum CommandExecutor {
    /// One function receives every invocation along with the selectors.
    Function(ExecutorFn),
    /// `[sub]` or `[group][sub]` lookup.
    Map(BTreeMap<String, ExecutorNode>),
}

impl CommandExecutor {
    /// Find the function for the given selectors.
    ///
    /// A single function handles everything; a map is walked by group then
    /// subcommand, and a miss returns `None`.
    pub fn route(&self, group: Option<&str>, sub: Option<&str>) -> Option<&ExecutorFn> {
        match self {
            CommandExecutor::Function(f) => Some(f),
            CommandExecutor::Map(map) => match (group, sub) {
                (Some(group), Some(sub)) => match map.get(group)? {
                    ExecutorNode::Map(subs) => subs.get(sub),
                    ExecutorNode::Function(_) => None,
                },
                (None, Some(sub)) => match map.get(sub)? {
                    ExecutorNode::Function(f) => Some(f),
                    ExecutorNode::Map(_) => None,
                },
                _ => None,
            },
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, CommandExecutor::Function(_))
    }
}

impl fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandExecutor::Function(_) => f.write_str("Function(..)"),
            CommandExecutor::Map(map) => {
                let mut list = f.debug_map();
                for (name, node) in map {
                    match node {
                        ExecutorNode::Function(_) => list.entry(name, &"fn"),
                        ExecutorNode::Map(subs) => {
                            list.entry(name, &subs.keys().collect::<Vec<_>>())
                        }
                    };
                }
                list.finish()
            }
        }
    }
}

/// A normalized command unit.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    pub descriptor: DescriptorSource,
    pub executor: CommandExecutor,
}

/// Subscription mode of an event unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    On,
    Once,
}

impl ListenMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ListenMode::On => "on",
            ListenMode::Once => "once",
        }
    }
}

/// A normalized event unit.
#[derive(Clone)]
pub struct EventHandler {
    pub event: String,
    pub mode: ListenMode,
    pub listener: ListenerFn,
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("event", &self.event)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Kind-specific half of a record.
#[derive(Debug, Clone)]
pub enum Handler {
    Command(CommandHandler),
    Event(EventHandler),
}

/// The unit of registry state: one source file reduced to a handler.
#[derive(Debug, Clone)]
pub struct HandlerRecord {
    source_path: PathBuf,
    handler: Handler,
}

impl HandlerRecord {
    pub fn new(source_path: impl Into<PathBuf>, handler: Handler) -> Self {
        Self {
            source_path: source_path.into(),
            handler,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn kind(&self) -> HandlerKind {
        match self.handler {
            Handler::Command(_) => HandlerKind::Command,
            Handler::Event(_) => HandlerKind::Event,
        }
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn as_command(&self) -> Option<&CommandHandler> {
        match &self.handler {
            Handler::Command(command) => Some(command),
            Handler::Event(_) => None,
        }
    }

    pub fn as_event(&self) -> Option<&EventHandler> {
        match &self.handler {
            Handler::Event(event) => Some(event),
            Handler::Command(_) => None,
        }
    }
}
