//! Directories polled by the change watcher, per handler kind.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::unit::HandlerKind;

#[derive(Debug, Default, Clone)]
pub struct WatchSet {
    commands: BTreeSet<PathBuf>,
    events: BTreeSet<PathBuf>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn dirs_mut(&mut self, kind: HandlerKind) -> &mut BTreeSet<PathBuf> {
        match kind {
            HandlerKind::Command => &mut self.commands,
            HandlerKind::Event => &mut self.events,
        }
    }

    pub fn dirs(&self, kind: HandlerKind) -> &BTreeSet<PathBuf> {
        match kind {
            HandlerKind::Command => &self.commands,
            HandlerKind::Event => &self.events,
        }
    }

    /// Returns `true` if the directory was not watched yet.
    pub fn insert(&mut self, kind: HandlerKind, dir: PathBuf) -> bool {
        self.dirs_mut(kind).insert(dir)
    }

    /// Watch the directory containing `path`.
    pub fn insert_parent_of(&mut self, kind: HandlerKind, path: &Path) -> bool {
        self.insert(kind, parent_dir(path))
    }

    pub fn remove(&mut self, kind: HandlerKind, dir: &Path) -> bool {
        self.dirs_mut(kind).remove(dir)
    }

    pub fn contains(&self, kind: HandlerKind, dir: &Path) -> bool {
        self.dirs(kind).contains(dir)
    }

    pub fn dir_count(&self) -> usize {
        self.commands.len() + self.events.len()
    }
}

/// Directory a unit file lives in; `.` for a bare file name.
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
