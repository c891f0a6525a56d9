//! Transient transpiled siblings.
//!
//! The file lives next to its source under a `_<seq><stem>` name, which
//! the candidate filter treats as disabled, so a watcher tick that races
//! the load never picks it up as a unit.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::LoadError;

/// Key stamped into every generated document.
pub const GENERATED_MARKER: &str = "$generated";

/// A transpiled copy on disk. Removed when dropped.
pub struct TransientUnit {
    file: NamedTempFile,
    source: PathBuf,
}

impl TransientUnit {
    /// Write `document` next to `source`, tagged with the generated marker.
    pub fn create(source: &Path, seq: u64, mut document: Value) -> Result<Self, LoadError> {
        let io_err = |e: std::io::Error| LoadError::Io {
            path: source.to_path_buf(),
            source: e,
        };

        let dir = source
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Value::Object(map) = &mut document {
            map.insert(
                GENERATED_MARKER.to_string(),
                Value::String(format!("transpiled from {}", source.display())),
            );
        }

        let rendered = serde_json::to_vec_pretty(&document).map_err(|e| LoadError::Transpile {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut file = tempfile::Builder::new()
            .prefix(&format!("_{seq}{stem}"))
            .suffix(".json")
            .tempfile_in(dir)
            .map_err(io_err)?;
        file.write_all(&rendered).map_err(io_err)?;
        file.flush().map_err(io_err)?;

        Ok(Self {
            file,
            source: source.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the file now, reporting a failed removal.
    pub fn close(self) -> Result<(), LoadError> {
        let source = self.source;
        self.file.close().map_err(|e| LoadError::Io { path: source, source: e })
    }
}
