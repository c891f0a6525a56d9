//! Realized per-target command manifests.

use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::unit::CommandDescriptor;

/// Source path to realized descriptor JSON, in push order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: IndexMap<String, Value>,
}

impl Manifest {
    /// Build from `(source path, descriptor)` pairs.
    ///
    /// Entries are ordered by descriptor name with the source path as the
    /// tie-break, so the result does not depend on load order.
    pub fn from_descriptors<'a>(
        items: impl IntoIterator<Item = (&'a Path, CommandDescriptor)>,
    ) -> Self {
        let mut items: Vec<(&Path, CommandDescriptor)> = items.into_iter().collect();
        items.sort_by(|(a_path, a), (b_path, b)| {
            a.name.cmp(&b.name).then_with(|| a_path.cmp(b_path))
        });

        let entries = items
            .into_iter()
            .map(|(path, descriptor)| (path.display().to_string(), descriptor.to_json()))
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The command list as sent to the platform.
    pub fn commands(&self) -> Vec<Value> {
        self.entries.values().cloned().collect()
    }

    /// Canonical serialized form; two manifests are equivalent iff these match.
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.entries).unwrap_or_default()
    }

    pub fn digest(&self) -> String {
        let hash = Sha256::digest(self.canonical().as_bytes());
        hash.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Descriptor JSON for a command name.
    pub fn find(&self, name: &str) -> Option<&Value> {
        self.entries
            .values()
            .find(|v| v.get("name").and_then(Value::as_str) == Some(name))
    }
}
