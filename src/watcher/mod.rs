//! Polling change watcher for unit directories.
//!
//! Every tick lists the watched directories, evicts units whose files are
//! gone, reloads units whose modification time moved and, if any command
//! changed, runs a single manifest sweep at the end.
//!
//! # States
//!
//! ```text
//! Idle --start()--> Polling --stop()--> Idle
//! ```
//!
//! Ticks never overlap: the loop sleeps only after a tick has completed,
//! and the modification-time cache is locked for the duration of a tick so
//! a manual [`ChangeWatcher::tick`] queues behind the loop's.

mod error;

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::loader::{UnitLoader, list_units};
use crate::registry::SharedRegistry;
use crate::sync::{ManifestSynchronizer, SyncReport};
use crate::unit::HandlerKind;

pub use error::WatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Polling,
}

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub created: Vec<(HandlerKind, PathBuf)>,
    pub updated: Vec<(HandlerKind, PathBuf)>,
    pub deleted: Vec<(HandlerKind, PathBuf)>,
    pub failed: Vec<(PathBuf, String)>,
    /// Present when a command changed and a sweep ran.
    pub sync: Option<SyncReport>,
}

impl TickReport {
    pub fn reloads(&self) -> usize {
        self.created.len() + self.updated.len()
    }

    /// Nothing was loaded, evicted or pushed.
    pub fn is_quiet(&self) -> bool {
        self.reloads() == 0 && self.deleted.is_empty() && self.failed.is_empty() && self.sync.is_none()
    }
}

struct WatcherInner {
    registry: SharedRegistry,
    units: Arc<UnitLoader>,
    sync: Arc<ManifestSynchronizer>,
    transpile: bool,
    interval: Duration,
    state: Mutex<WatcherState>,
    /// Bumped on every start and stop; a loop exits once its generation is stale.
    generation: AtomicU64,
    mtimes: AsyncMutex<HashMap<PathBuf, SystemTime>>,
}

#[derive(Clone)]
pub struct ChangeWatcher {
    inner: Arc<WatcherInner>,
}

impl ChangeWatcher {
    pub fn new(
        registry: SharedRegistry,
        units: Arc<UnitLoader>,
        sync: Arc<ManifestSynchronizer>,
        transpile: bool,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                registry,
                units,
                sync,
                transpile,
                interval,
                state: Mutex::new(WatcherState::Idle),
                generation: AtomicU64::new(0),
                mtimes: AsyncMutex::new(HashMap::new()),
            }),
        }
    }

    pub fn state(&self) -> WatcherState {
        *self.inner.state.lock()
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Start the polling loop on the current tokio runtime.
    pub fn start(&self) -> Result<(), WatchError> {
        let generation = {
            let mut state = self.inner.state.lock();
            if *state == WatcherState::Polling {
                return Err(WatchError::AlreadyPolling);
            }
            *state = WatcherState::Polling;
            self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let inner = self.inner.clone();
        tokio::spawn(async move {
            crate::log_event!("watcher", "polling", "every {:?}", inner.interval);
            while inner.is_current(generation) {
                inner.tick().await;
                tokio::time::sleep(inner.interval).await;
            }
            crate::debug_event!("watcher", "loop exited", "generation {generation}");
        });
        Ok(())
    }

    /// Stop scheduling ticks. A tick already running completes.
    pub fn stop(&self) -> Result<(), WatchError> {
        let mut state = self.inner.state.lock();
        if *state == WatcherState::Idle {
            return Err(WatchError::NotPolling);
        }
        *state = WatcherState::Idle;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        crate::log_event!("watcher", "stopped");
        Ok(())
    }

    /// Run one tick now, waiting for any tick in progress first.
    pub async fn tick(&self) -> TickReport {
        self.inner.tick().await
    }
}

impl WatcherInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn tick(&self) -> TickReport {
        let mut mtimes = self.mtimes.lock().await;
        let mut report = TickReport::default();
        let mut commands_changed = false;

        let kinds = [HandlerKind::Command, HandlerKind::Event];
        let live: Vec<(HandlerKind, BTreeSet<PathBuf>)> = kinds
            .iter()
            .map(|&kind| {
                let dirs = self.registry.read().watched_dirs(kind);
                let files = dirs.iter().flat_map(|dir| list_units(dir)).collect();
                (kind, files)
            })
            .collect();

        // Evictions for every kind happen before any reload.
        for (kind, files) in &live {
            let stale: Vec<PathBuf> = self
                .registry
                .read()
                .snapshot(*kind)
                .iter()
                .map(|record| record.source_path().to_path_buf())
                .filter(|path| !files.contains(path))
                .collect();

            for path in stale {
                if self.registry.write().evict(*kind, &path).is_some() {
                    crate::log_event!(kind.as_str(), "deleted", "{}", path.display());
                    commands_changed |= *kind == HandlerKind::Command;
                    report.deleted.push((*kind, path));
                }
            }
        }

        for (kind, files) in &live {
            for path in files {
                let Some(modified) = modified_time(path) else {
                    continue;
                };
                let known = self.registry.read().contains(*kind, path);

                match mtimes.get(path) {
                    None if known => {
                        // Loaded outside the watcher; start tracking without reloading.
                        mtimes.insert(path.clone(), modified);
                        continue;
                    }
                    Some(previous) if *previous == modified => continue,
                    _ => {}
                }
                mtimes.insert(path.clone(), modified);

                match self.units.load_unit(*kind, path, self.transpile) {
                    Ok(Some(record)) => {
                        let replaced = self.registry.write().admit(record);
                        if replaced.is_some() {
                            crate::log_event!(kind.as_str(), "updated", "{}", path.display());
                            report.updated.push((*kind, path.clone()));
                        } else {
                            crate::log_event!(kind.as_str(), "created", "{}", path.display());
                            report.created.push((*kind, path.clone()));
                        }
                        commands_changed |= *kind == HandlerKind::Command;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!("[{}] failed to load {}: {e}", kind.as_str(), path.display());
                        report.failed.push((path.clone(), e.to_string()));
                    }
                }
            }
        }

        mtimes.retain(|path, _| live.iter().any(|(_, files)| files.contains(path)));

        if commands_changed {
            match self.sync.push_all().await {
                Ok(sync) => report.sync = Some(sync),
                Err(e) => tracing::warn!("[watcher] manifest sweep failed: {e}"),
            }
        }

        report
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
