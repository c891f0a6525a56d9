pub mod bot;
pub mod builtins;
pub mod cli;
pub mod client;
pub mod config;
pub mod console;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod loader;
pub mod logging;
pub mod platform;
pub mod registry;
pub mod sync;
pub mod unit;
pub mod watcher;

pub use bot::{BatchReport, Bot};
pub use client::Client;
pub use config::Settings;
pub use dispatch::{DispatchOutcome, Invocation};
pub use error::{ConfigurationError, LoadError, PlatformError, UnitError, ValidationError};
pub use events::{EventBus, EventContext};
pub use platform::{DryRunPlatform, HttpPlatform, Interaction, Platform, Reply, TargetContext};
pub use sync::{ManifestSynchronizer, PushOutcome, SyncReport};
pub use unit::{Bindings, CommandDescriptor, HandlerKind, HandlerRecord};
pub use watcher::{ChangeWatcher, TickReport};
