//! Per-target manifest cache with aliasing.
//!
//! A target either owns a manifest or points at another target whose
//! manifest is identical. Chains are resolved with a hop limit.

use std::collections::{BTreeMap, BTreeSet};

use super::Manifest;

/// Longest alias chain followed before giving up.
const MAX_ALIAS_HOPS: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    Manifest { manifest: Manifest, digest: String },
    Alias(String),
}

impl CacheEntry {
    pub fn manifest(manifest: Manifest) -> Self {
        let digest = manifest.digest();
        CacheEntry::Manifest { manifest, digest }
    }
}

#[derive(Debug, Default)]
pub struct ManifestCache {
    entries: BTreeMap<String, CacheEntry>,
    failed: BTreeSet<String>,
    dirty: bool,
}

impl ManifestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, target_id: &str) -> Option<&CacheEntry> {
        self.entries.get(target_id)
    }

    /// Follow aliases to the target that owns the manifest.
    pub fn resolve_owner<'a>(&'a self, target_id: &'a str) -> Option<&'a str> {
        let mut current = target_id;
        for _ in 0..=MAX_ALIAS_HOPS {
            match self.entries.get(current)? {
                CacheEntry::Manifest { .. } => return Some(current),
                CacheEntry::Alias(next) => current = next,
            }
        }
        tracing::warn!("[sync] alias chain from {target_id} exceeds {MAX_ALIAS_HOPS} hops");
        None
    }

    /// The manifest a target was last synchronized to.
    pub fn resolve(&self, target_id: &str) -> Option<(&Manifest, &str)> {
        let owner = self.resolve_owner(target_id)?;
        match self.entries.get(owner)? {
            CacheEntry::Manifest { manifest, digest } => Some((manifest, digest.as_str())),
            CacheEntry::Alias(_) => None,
        }
    }

    /// An owning target, other than `exclude`, whose manifest has `digest`.
    pub fn find_identical(&self, digest: &str, exclude: &str) -> Option<String> {
        self.entries.iter().find_map(|(id, entry)| match entry {
            CacheEntry::Manifest { digest: d, .. } if d == digest && id != exclude => {
                Some(id.clone())
            }
            _ => None,
        })
    }

    fn dependants_of(&self, target_id: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(id, e)| {
                id.as_str() != target_id && matches!(e, CacheEntry::Alias(to) if to == target_id)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Re-home targets that aliased `target_id` onto what was actually
    /// deployed to them: the first (by id) takes over the old manifest and
    /// the rest alias it; if the old entry was itself an alias they follow
    /// that alias instead.
    fn detach(&mut self, target_id: &str, dependants: &[String], previous: Option<CacheEntry>) {
        let Some((heir, rest)) = dependants.split_first() else {
            return;
        };
        match previous {
            Some(CacheEntry::Manifest { manifest, digest }) => {
                self.entries
                    .insert(heir.clone(), CacheEntry::Manifest { manifest, digest });
                for id in rest {
                    self.entries.insert(id.clone(), CacheEntry::Alias(heir.clone()));
                }
                crate::debug_event!("sync", "detached", "{heir} takes over {target_id}'s manifest");
            }
            Some(CacheEntry::Alias(to)) => {
                for id in dependants {
                    self.entries.insert(id.clone(), CacheEntry::Alias(to.clone()));
                }
            }
            None => {}
        }
    }

    /// Set a target's entry, detaching any targets that aliased it.
    pub fn replace(&mut self, target_id: &str, entry: CacheEntry) {
        let dependants = self.dependants_of(target_id);
        let previous = self.entries.insert(target_id.to_string(), entry);
        self.detach(target_id, &dependants, previous);
        self.dirty = true;
    }

    /// Drop a target's entry so the next sweep pushes it again.
    pub fn invalidate(&mut self, target_id: &str) -> bool {
        let dependants = self.dependants_of(target_id);
        let Some(previous) = self.entries.remove(target_id) else {
            return false;
        };
        self.detach(target_id, &dependants, Some(previous));
        self.failed.remove(target_id);
        self.dirty = true;
        true
    }

    pub fn mark_failed(&mut self, target_id: &str) {
        self.failed.insert(target_id.to_string());
    }

    pub fn mark_succeeded(&mut self, target_id: &str) {
        self.failed.remove(target_id);
    }

    pub fn is_failed(&self, target_id: &str) -> bool {
        self.failed.contains(target_id)
    }

    /// Whether the cache changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn target_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
