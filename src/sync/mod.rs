//! Per-target command manifest synchronization.
//!
//! Each sweep realizes the manifest every target should have, compares it
//! with what was last pushed there and only calls the platform when the
//! content differs. Targets with identical manifests share one cache entry
//! and, when `share_identical_manifests` is on, one push.

mod cache;
mod manifest;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::SyncConfig;
use crate::error::PlatformError;
use crate::platform::{Platform, TargetContext};
use crate::registry::SharedRegistry;
use crate::unit::{CommandDescriptor, HandlerKind, HandlerRecord};

pub use cache::{CacheEntry, ManifestCache};
pub use manifest::Manifest;

/// Result of synchronizing one target.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// The cached manifest already matches; nothing was sent.
    Unchanged,
    /// Shares an identical manifest already pushed to another target.
    Aliased { to: String },
    Pushed { commands: usize },
    /// The platform rejected the push. The cache still advanced.
    Failed { error: String },
}

/// Result of a sweep over every target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub outcomes: Vec<(String, PushOutcome)>,
}

impl SyncReport {
    pub fn pushed(&self) -> usize {
        self.count(|o| matches!(o, PushOutcome::Pushed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PushOutcome::Failed { .. }))
    }

    pub fn aliased(&self) -> usize {
        self.count(|o| matches!(o, PushOutcome::Aliased { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, PushOutcome::Unchanged))
    }

    fn count(&self, f: impl Fn(&PushOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| f(o)).count()
    }

    pub fn outcome(&self, target_id: &str) -> Option<&PushOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == target_id)
            .map(|(_, o)| o)
    }
}

pub struct ManifestSynchronizer {
    platform: Arc<dyn Platform>,
    registry: SharedRegistry,
    config: SyncConfig,
    /// Held across a whole sweep so sweeps never interleave.
    cache: Mutex<ManifestCache>,
    /// Targets seen by the last sweep.
    known: RwLock<HashMap<String, TargetContext>>,
}

impl ManifestSynchronizer {
    pub fn new(platform: Arc<dyn Platform>, registry: SharedRegistry, config: SyncConfig) -> Self {
        Self {
            platform,
            registry,
            config,
            cache: Mutex::new(ManifestCache::new()),
            known: RwLock::new(HashMap::new()),
        }
    }

    /// Realize the manifest a target should currently have.
    pub fn realize(&self, target: &TargetContext) -> Manifest {
        let records = self.registry.read().snapshot(HandlerKind::Command);
        Manifest::from_descriptors(
            records
                .iter()
                .filter_map(|record| realize_record(record, target).map(|d| (record.source_path(), d))),
        )
    }

    /// Synchronize every target the platform reports, one after another.
    pub async fn push_all(&self) -> Result<SyncReport, PlatformError> {
        let targets = self.platform.targets().await?;
        let mut cache = self.cache.lock().await;
        let mut report = SyncReport::default();

        for target in &targets {
            let outcome = self.push_locked(&mut cache, target).await;
            report.outcomes.push((target.id.clone(), outcome));
        }

        if cache.take_dirty() {
            crate::log_event!(
                "sync",
                "sweep done",
                "{} pushed, {} aliased, {} unchanged, {} failed",
                report.pushed(),
                report.aliased(),
                report.unchanged(),
                report.failed()
            );
        } else {
            crate::debug_event!("sync", "sweep done", "no manifest changed");
        }
        Ok(report)
    }

    /// Synchronize one target.
    pub async fn push_for(&self, target: &TargetContext) -> PushOutcome {
        let mut cache = self.cache.lock().await;
        let outcome = self.push_locked(&mut cache, target).await;
        cache.take_dirty();
        outcome
    }

    async fn push_locked(&self, cache: &mut ManifestCache, target: &TargetContext) -> PushOutcome {
        self.known.write().insert(target.id.clone(), target.clone());

        let manifest = self.realize(target);
        let digest = manifest.digest();

        if let Some((_, cached)) = cache.resolve(&target.id) {
            if cached == digest {
                crate::debug_event!("sync", "unchanged", "{}", target.id);
                return PushOutcome::Unchanged;
            }
        }

        if let Some(owner) = cache.find_identical(&digest, &target.id) {
            let owner_failed = cache.is_failed(&owner);
            cache.replace(&target.id, CacheEntry::Alias(owner.clone()));
            if self.config.share_identical_manifests && !owner_failed {
                crate::log_event!("sync", "aliased", "{} shares {}'s manifest", target.id, owner);
                cache.mark_succeeded(&target.id);
                return PushOutcome::Aliased { to: owner };
            }
            return self.send(cache, target, &manifest).await;
        }

        cache.replace(
            &target.id,
            CacheEntry::Manifest {
                manifest: manifest.clone(),
                digest,
            },
        );
        self.send(cache, target, &manifest).await
    }

    async fn send(
        &self,
        cache: &mut ManifestCache,
        target: &TargetContext,
        manifest: &Manifest,
    ) -> PushOutcome {
        match self.platform.fetch_commands(target).await {
            Ok(deployed) => {
                crate::debug_event!("sync", "fetched", "{}: {} deployed", target.id, deployed.len())
            }
            Err(e) => tracing::warn!("[sync] could not fetch commands for {}: {e}", target.id),
        }

        match self.platform.set_commands(target, manifest.commands()).await {
            Ok(()) => {
                crate::log_event!("sync", "pushed", "{} commands to {}", manifest.len(), target.id);
                cache.mark_succeeded(&target.id);
                PushOutcome::Pushed {
                    commands: manifest.len(),
                }
            }
            Err(e) => {
                tracing::warn!("[sync] push to {} failed: {e}", target.id);
                cache.mark_failed(&target.id);
                PushOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Forget what was pushed to a target so the next sweep pushes again.
    pub async fn invalidate(&self, target_id: &str) -> bool {
        let removed = self.cache.lock().await.invalidate(target_id);
        if removed {
            crate::log_event!("sync", "invalidated", "{target_id}");
        }
        removed
    }

    /// The manifest last synchronized to a target, aliases resolved.
    pub async fn cached_manifest(&self, target_id: &str) -> Option<Manifest> {
        self.cache
            .lock()
            .await
            .resolve(target_id)
            .map(|(manifest, _)| manifest.clone())
    }

    /// Raw cache entry for a target.
    pub async fn cache_entry(&self, target_id: &str) -> Option<CacheEntry> {
        self.cache.lock().await.entry(target_id).cloned()
    }

    pub async fn is_failed(&self, target_id: &str) -> bool {
        self.cache.lock().await.is_failed(target_id)
    }

    /// Context for a target id. Targets no sweep has seen yet are looked up
    /// on the platform; an id the platform does not report gets an unnamed
    /// context.
    pub async fn target_context(&self, target_id: &str) -> TargetContext {
        if let Some(target) = self.known.read().get(target_id) {
            return target.clone();
        }

        match self.platform.targets().await {
            Ok(targets) => {
                let mut known = self.known.write();
                for target in targets {
                    known.entry(target.id.clone()).or_insert(target);
                }
                if let Some(target) = known.get(target_id) {
                    return target.clone();
                }
            }
            Err(e) => tracing::warn!("[sync] could not list targets: {e}"),
        }
        TargetContext::new(target_id, "")
    }

    /// The command record that answers `name` on a target.
    pub async fn resolve_command(
        &self,
        target_id: &str,
        name: &str,
    ) -> Option<(Arc<HandlerRecord>, CommandDescriptor)> {
        let target = self.target_context(target_id).await;
        let records = self.registry.read().snapshot(HandlerKind::Command);
        records.into_iter().find_map(|record| {
            let descriptor = realize_record(&record, &target)?;
            (descriptor.name == name).then_some((record, descriptor))
        })
    }

    /// Descriptor JSON per source path currently cached for a target.
    pub async fn commands_for(&self, target_id: &str) -> Vec<(String, Value)> {
        self.cached_manifest(target_id)
            .await
            .map(|m| {
                m.entries()
                    .map(|(path, value)| (path.to_string(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Evaluate a command record's descriptor for a target.
///
/// Per-target builders run here; one that produces an invalid descriptor is
/// left out of the manifest.
fn realize_record(record: &HandlerRecord, target: &TargetContext) -> Option<CommandDescriptor> {
    let command = record.as_command()?;
    let descriptor = command.descriptor.realize(target)?;
    if command.descriptor.as_static().is_none() {
        if let Err(e) = descriptor.validate() {
            tracing::warn!(
                "[sync] {} built an invalid descriptor for {}: {e}",
                record.source_path().display(),
                target.id
            );
            return None;
        }
    }
    Some(descriptor)
}
