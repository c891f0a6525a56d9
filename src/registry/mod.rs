//! In-memory handler registry.
//!
//! Keyed by source path, split into commands and events. Event records own
//! a subscription on the client's [`EventBus`]; replacing or evicting one
//! drops the old subscription before anything new is installed.

mod watch_set;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::events::{EventBus, SubscriptionId};
use crate::unit::{Handler, HandlerKind, HandlerRecord};

pub use watch_set::{WatchSet, parent_dir};

/// Registry shared between the watcher, synchronizer and dispatcher.
pub type SharedRegistry = Arc<RwLock<Registry>>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveSubscription {
    event: String,
    id: SubscriptionId,
}

pub struct Registry {
    bus: EventBus,
    commands: BTreeMap<PathBuf, Arc<HandlerRecord>>,
    events: BTreeMap<PathBuf, Arc<HandlerRecord>>,
    subscriptions: HashMap<PathBuf, ActiveSubscription>,
    watched: WatchSet,
}

impl Registry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            commands: BTreeMap::new(),
            events: BTreeMap::new(),
            subscriptions: HashMap::new(),
            watched: WatchSet::new(),
        }
    }

    pub fn shared(bus: EventBus) -> SharedRegistry {
        Arc::new(RwLock::new(Self::new(bus)))
    }

    fn partition(&self, kind: HandlerKind) -> &BTreeMap<PathBuf, Arc<HandlerRecord>> {
        match kind {
            HandlerKind::Command => &self.commands,
            HandlerKind::Event => &self.events,
        }
    }

    fn partition_mut(&mut self, kind: HandlerKind) -> &mut BTreeMap<PathBuf, Arc<HandlerRecord>> {
        match kind {
            HandlerKind::Command => &mut self.commands,
            HandlerKind::Event => &mut self.events,
        }
    }

    /// Install a record, replacing any record at the same path.
    ///
    /// Returns the replaced record. The parent directory of the source
    /// path joins the watch set.
    pub fn admit(&mut self, record: HandlerRecord) -> Option<Arc<HandlerRecord>> {
        let kind = record.kind();
        let path = record.source_path().to_path_buf();

        if kind == HandlerKind::Event {
            self.unsubscribe(&path);
            if let Handler::Event(event) = record.handler() {
                let id = self
                    .bus
                    .subscribe(event.event.clone(), event.mode, event.listener.clone());
                crate::debug_event!(
                    "registry",
                    "subscribed",
                    "{} ({}) from {}",
                    event.event,
                    event.mode.as_str(),
                    path.display()
                );
                self.subscriptions.insert(
                    path.clone(),
                    ActiveSubscription {
                        event: event.event.clone(),
                        id,
                    },
                );
            }
        }

        self.watched.insert_parent_of(kind, &path);
        self.partition_mut(kind).insert(path, Arc::new(record))
    }

    /// Remove the record at `path`.
    pub fn evict(&mut self, kind: HandlerKind, path: &Path) -> Option<Arc<HandlerRecord>> {
        let removed = self.partition_mut(kind).remove(path);
        if removed.is_some() && kind == HandlerKind::Event {
            self.unsubscribe(path);
        }
        removed
    }

    fn unsubscribe(&mut self, path: &Path) {
        if let Some(previous) = self.subscriptions.remove(path) {
            // A once listener that already fired is gone from the bus.
            let removed = self.bus.off(&previous.event, previous.id);
            crate::debug_event!(
                "registry",
                "unsubscribed",
                "{} from {} (active: {removed})",
                previous.event,
                path.display()
            );
        }
    }

    /// Records of one kind, ordered by source path.
    pub fn snapshot(&self, kind: HandlerKind) -> Vec<Arc<HandlerRecord>> {
        self.partition(kind).values().cloned().collect()
    }

    pub fn get(&self, kind: HandlerKind, path: &Path) -> Option<Arc<HandlerRecord>> {
        self.partition(kind).get(path).cloned()
    }

    pub fn contains(&self, kind: HandlerKind, path: &Path) -> bool {
        self.partition(kind).contains_key(path)
    }

    pub fn len(&self, kind: HandlerKind) -> usize {
        self.partition(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.events.is_empty()
    }

    /// Source paths of one kind that live directly in `dir`.
    pub fn paths_in(&self, kind: HandlerKind, dir: &Path) -> Vec<PathBuf> {
        self.partition(kind)
            .keys()
            .filter(|path| parent_dir(path) == dir)
            .cloned()
            .collect()
    }

    pub fn watch_dir(&mut self, kind: HandlerKind, dir: PathBuf) -> bool {
        self.watched.insert(kind, dir)
    }

    /// Stop watching `dir` and evict every record that lived in it.
    pub fn unwatch_dir(&mut self, kind: HandlerKind, dir: &Path) -> Vec<Arc<HandlerRecord>> {
        self.watched.remove(kind, dir);
        self.paths_in(kind, dir)
            .into_iter()
            .filter_map(|path| self.evict(kind, &path))
            .collect()
    }

    pub fn watched_dirs(&self, kind: HandlerKind) -> BTreeSet<PathBuf> {
        self.watched.dirs(kind).clone()
    }
}
