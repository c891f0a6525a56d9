//! The runtime facade.
//!
//! [`Bot`] wires the loader, registry, synchronizer, dispatcher and watcher
//! around one [`Client`] and exposes the operations the binary, the console
//! and a gateway adapter need.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::client::Client;
use crate::config::Settings;
use crate::dispatch::{DispatchOutcome, InteractionDispatcher};
use crate::error::{ConfigurationError, LoadError, PlatformError, UnitError, UnitResult};
use crate::loader::{HandlerNormalizer, UnitLoader, list_units, normalize_path};
use crate::platform::{Interaction, Platform};
use crate::registry::{Registry, SharedRegistry};
use crate::sync::{ManifestSynchronizer, SyncReport};
use crate::unit::{Bindings, HandlerKind, HandlerRecord};
use crate::watcher::{ChangeWatcher, WatchError};

/// Result of loading a whole unit directory.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub loaded: Vec<PathBuf>,
    pub evicted: Vec<PathBuf>,
    pub failed: Vec<UnitError>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Bot {
    settings: Arc<Settings>,
    client: Client,
    registry: SharedRegistry,
    units: Arc<UnitLoader>,
    sync: Arc<ManifestSynchronizer>,
    dispatcher: InteractionDispatcher,
    watcher: ChangeWatcher,
}

impl Bot {
    pub fn new(settings: Settings, platform: Arc<dyn Platform>, bindings: Bindings) -> Self {
        let settings = Arc::new(settings);
        let client = Client::new(platform.clone());
        let registry = Registry::shared(client.events().clone());
        let units = Arc::new(UnitLoader::new(HandlerNormalizer::new(bindings, client.clone())));
        let sync = Arc::new(ManifestSynchronizer::new(
            platform,
            registry.clone(),
            settings.sync.clone(),
        ));
        let dispatcher = InteractionDispatcher::new(client.clone(), sync.clone());
        let watcher = ChangeWatcher::new(
            registry.clone(),
            units.clone(),
            sync.clone(),
            settings.units.transpile,
            settings.poll_interval(),
        );

        Self {
            settings,
            client,
            registry,
            units,
            sync,
            dispatcher,
            watcher,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn synchronizer(&self) -> &Arc<ManifestSynchronizer> {
        &self.sync
    }

    pub fn watcher(&self) -> &ChangeWatcher {
        &self.watcher
    }

    /// Verify the platform, load both unit directories, push, and start
    /// watching when enabled.
    ///
    /// Only a failed verification is an error; unit failures are logged.
    pub async fn start(&self) -> Result<(), ConfigurationError> {
        self.client.platform().verify().await?;

        let transpile = self.settings.units.transpile;
        let commands = self
            .register_commands(
                &self.settings.units.commands_dir,
                transpile,
                self.settings.sync.broadcast_on_register,
            )
            .await;
        let events = self.register_events(&self.settings.units.events_dir, transpile);
        crate::log_event!(
            "bot",
            "units loaded",
            "{} commands, {} events, {} failed",
            commands.loaded.len(),
            events.loaded.len(),
            commands.failed.len() + events.failed.len()
        );

        if self.settings.watcher.enabled {
            if let Err(e) = self.watcher.start() {
                tracing::warn!("[bot] {e}");
            }
        }
        Ok(())
    }

    /// Load one command unit. Returns `None` if the file is disabled or
    /// has an unsupported extension.
    pub async fn register_command(
        &self,
        path: impl AsRef<Path>,
        transpile: bool,
        broadcast: bool,
    ) -> UnitResult<Option<Arc<HandlerRecord>>> {
        let admitted = self.register(HandlerKind::Command, path.as_ref(), transpile)?;
        if admitted.is_some() && broadcast {
            self.broadcast_logged().await;
        }
        Ok(admitted)
    }

    pub fn register_event(
        &self,
        path: impl AsRef<Path>,
        transpile: bool,
    ) -> UnitResult<Option<Arc<HandlerRecord>>> {
        self.register(HandlerKind::Event, path.as_ref(), transpile)
    }

    fn register(
        &self,
        kind: HandlerKind,
        path: &Path,
        transpile: bool,
    ) -> UnitResult<Option<Arc<HandlerRecord>>> {
        let Some(record) = self.units.load_unit(kind, path, transpile)? else {
            return Ok(None);
        };
        let path = record.source_path().to_path_buf();
        let mut registry = self.registry.write();
        let replaced = registry.admit(record);
        crate::log_event!(
            kind.as_str(),
            if replaced.is_some() { "updated" } else { "created" },
            "{}",
            path.display()
        );
        Ok(registry.get(kind, &path))
    }

    /// Load every command unit in `dir` and watch it. Pushes once afterwards
    /// when `broadcast` is set and no file failed.
    pub async fn register_commands(
        &self,
        dir: impl AsRef<Path>,
        transpile: bool,
        broadcast: bool,
    ) -> BatchReport {
        let report = self.register_dir(HandlerKind::Command, dir.as_ref(), transpile);
        if broadcast && report.is_clean() {
            self.broadcast_logged().await;
        }
        report
    }

    pub fn register_events(&self, dir: impl AsRef<Path>, transpile: bool) -> BatchReport {
        self.register_dir(HandlerKind::Event, dir.as_ref(), transpile)
    }

    fn register_dir(&self, kind: HandlerKind, dir: &Path, transpile: bool) -> BatchReport {
        let dir = normalize_path(dir);
        let mut report = BatchReport::default();

        if let Err(e) = std::fs::create_dir_all(&dir) {
            report.failed.push(UnitError::Load(LoadError::Io {
                path: dir,
                source: e,
            }));
            return report;
        }

        let files = list_units(&dir);
        {
            let mut registry = self.registry.write();
            for path in registry.paths_in(kind, &dir) {
                if !files.contains(&path) && registry.evict(kind, &path).is_some() {
                    crate::log_event!(kind.as_str(), "deleted", "{}", path.display());
                    report.evicted.push(path);
                }
            }
        }

        for path in files {
            match self.register(kind, &path, transpile) {
                Ok(Some(_)) => report.loaded.push(path),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("[{}] {e}", kind.as_str());
                    report.failed.push(e);
                }
            }
        }

        self.registry.write().watch_dir(kind, dir);
        report
    }

    pub fn commands(&self) -> Vec<Arc<HandlerRecord>> {
        self.registry.read().snapshot(HandlerKind::Command)
    }

    pub fn events(&self) -> Vec<Arc<HandlerRecord>> {
        self.registry.read().snapshot(HandlerKind::Event)
    }

    /// Source path and descriptor JSON of every command last synchronized
    /// to a target.
    pub async fn commands_for(&self, target_id: &str) -> Vec<(String, Value)> {
        self.sync.commands_for(target_id).await
    }

    pub async fn broadcast_commands(&self) -> Result<SyncReport, PlatformError> {
        self.sync.push_all().await
    }

    async fn broadcast_logged(&self) {
        if let Err(e) = self.broadcast_commands().await {
            tracing::warn!("[bot] could not list targets for broadcast: {e}");
        }
    }

    /// Stop watching a directory and evict its units.
    pub fn unwatch(&self, kind: HandlerKind, dir: impl AsRef<Path>) -> Vec<Arc<HandlerRecord>> {
        let dir = normalize_path(dir.as_ref());
        let evicted = self.registry.write().unwatch_dir(kind, &dir);
        crate::log_event!(
            kind.as_str(),
            "unwatched",
            "{} ({} evicted)",
            dir.display(),
            evicted.len()
        );
        evicted
    }

    pub async fn emit_event(&self, name: &str, payload: Value) -> usize {
        self.client.emit(name, payload).await
    }

    pub async fn handle_interaction(&self, interaction: Interaction) -> DispatchOutcome {
        self.dispatcher.dispatch(interaction).await
    }

    pub async fn invalidate(&self, target_id: &str) -> bool {
        self.sync.invalidate(target_id).await
    }

    pub fn start_watching(&self) -> Result<(), WatchError> {
        self.watcher.start()
    }

    pub fn stop_watching(&self) -> Result<(), WatchError> {
        self.watcher.stop()
    }
}
