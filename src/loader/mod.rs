//! Unit file loading.
//!
//! [`ModuleLoader`] turns a file on disk into [`ModuleExports`];
//! [`HandlerNormalizer`] reduces those exports to a [`HandlerRecord`].
//! [`UnitLoader`] chains the two.

mod normalize;
mod transient;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::error::{LoadError, UnitError, UnitResult};
use crate::unit::{HandlerKind, HandlerRecord};

pub use normalize::HandlerNormalizer;
pub use transient::{GENERATED_MARKER, TransientUnit};

/// Extensions recognized as unit files.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["json", "toml"];

/// File names starting with this are disabled drafts.
pub const DISABLED_PREFIX: char = '_';

/// Extension of the typed dialect that gets transpiled.
const TYPED_DIALECT: &str = "toml";

/// The evaluated top level of a unit file.
#[derive(Debug, Clone)]
pub struct ModuleExports {
    path: PathBuf,
    document: Map<String, Value>,
}

impl ModuleExports {
    pub fn new(path: impl Into<PathBuf>, document: Map<String, Value>) -> Self {
        Self {
            path: path.into(),
            document,
        }
    }

    /// Source path the exports were loaded for.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_export(&self) -> Option<&Value> {
        self.document.get("default")
    }

    pub fn build(&self) -> Option<&Value> {
        self.document.get("build")
    }

    pub fn name(&self) -> Option<&str> {
        self.document.get("name").and_then(Value::as_str)
    }

    pub fn once(&self) -> bool {
        self.document
            .get("once")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is_generated(&self) -> bool {
        self.document.contains_key(GENERATED_MARKER)
    }

    /// Stem of the source file name.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(ModuleExports),
    /// Unsupported extension or disabled file name.
    Skipped,
}

/// Whether a path names a loadable unit.
pub fn is_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with(DISABLED_PREFIX) {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
}

/// Candidate unit files directly inside `dir`, sorted. A missing
/// directory yields an empty list.
pub fn list_units(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_candidate(path))
        .collect();
    files.sort();
    files
}

/// Absolute form of a path without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Reads unit files into exports.
#[derive(Debug, Default)]
pub struct ModuleLoader {
    seq: AtomicU64,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a unit file.
    ///
    /// Every call re-reads the file, so a reload always sees current content.
    pub fn load(&self, path: &Path, transpile: bool) -> Result<LoadOutcome, LoadError> {
        if !is_candidate(path) {
            crate::debug_event!("loader", "skipped", "{}", path.display());
            return Ok(LoadOutcome::Skipped);
        }

        let text = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let is_typed = path.extension().and_then(|e| e.to_str()) == Some(TYPED_DIALECT);
        let document = if !is_typed {
            parse_json(path, &text)?
        } else if transpile {
            self.load_transpiled(path, &text)?
        } else {
            let value = transpile_toml(path, &text)?;
            into_object(path, value)?
        };

        Ok(LoadOutcome::Loaded(ModuleExports::new(path, document)))
    }

    fn load_transpiled(&self, path: &Path, text: &str) -> Result<Map<String, Value>, LoadError> {
        let value = transpile_toml(path, text)?;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);

        // Dropping the guard on an early return removes the file as well.
        let transient = TransientUnit::create(path, seq, value)?;
        crate::debug_event!(
            "loader",
            "transpiled",
            "{} -> {}",
            path.display(),
            transient.path().display()
        );

        let generated = std::fs::read_to_string(transient.path()).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let document = parse_json(path, &generated)?;
        transient.close()?;
        Ok(document)
    }
}

fn transpile_toml(path: &Path, text: &str) -> Result<Value, LoadError> {
    toml::from_str::<Value>(text).map_err(|e| LoadError::Transpile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn parse_json(path: &Path, text: &str) -> Result<Map<String, Value>, LoadError> {
    let value: Value = serde_json::from_str(text).map_err(|e| LoadError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    into_object(path, value)
}

fn into_object(path: &Path, value: Value) -> Result<Map<String, Value>, LoadError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(LoadError::Parse {
            path: path.to_path_buf(),
            reason: format!("expected a table of exports, found {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Loader and normalizer chained into one step.
pub struct UnitLoader {
    modules: ModuleLoader,
    normalizer: HandlerNormalizer,
}

impl UnitLoader {
    pub fn new(normalizer: HandlerNormalizer) -> Self {
        Self {
            modules: ModuleLoader::new(),
            normalizer,
        }
    }

    /// Load and normalize one file. `Ok(None)` means the file was skipped.
    pub fn load_unit(
        &self,
        kind: HandlerKind,
        path: &Path,
        transpile: bool,
    ) -> UnitResult<Option<HandlerRecord>> {
        let path = normalize_path(path);
        let exports = match self.modules.load(&path, transpile)? {
            LoadOutcome::Loaded(exports) => exports,
            LoadOutcome::Skipped => return Ok(None),
        };

        let handler = match kind {
            HandlerKind::Command => self.normalizer.normalize_command(&exports),
            HandlerKind::Event => self.normalizer.normalize_event(&exports),
        }
        .map_err(|source| UnitError::Validation {
            path: path.clone(),
            source,
        })?;

        Ok(Some(HandlerRecord::new(path, handler)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_candidate_filter() {
        assert!(is_candidate(Path::new("/u/ping.json")));
        assert!(is_candidate(Path::new("/u/ping.toml")));
        assert!(!is_candidate(Path::new("/u/_draft.json")));
        assert!(!is_candidate(Path::new("/u/_0ping1a2b3c.json")));
        assert!(!is_candidate(Path::new("/u/readme.md")));
        assert!(!is_candidate(Path::new("/u/noext")));
    }

    #[test]
    fn test_list_units_direct_children_sorted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();
        fs::write(dir.path().join("a.toml"), "").unwrap();
        fs::write(dir.path().join("_off.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.json"), "{}").unwrap();

        let names: Vec<String> = list_units(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.toml", "b.json"]);

        assert!(list_units(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_load_json_and_skip_disabled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ping.json");
        fs::write(&path, r#"{"default": "ping", "build": {"name": "ping"}}"#).unwrap();

        let loader = ModuleLoader::new();
        let LoadOutcome::Loaded(exports) = loader.load(&path, true).unwrap() else {
            panic!("expected exports");
        };
        assert_eq!(exports.default_export(), Some(&Value::String("ping".into())));
        assert!(!exports.is_generated());

        let disabled = dir.path().join("_ping.json");
        fs::write(&disabled, "{}").unwrap();
        assert!(matches!(
            loader.load(&disabled, true).unwrap(),
            LoadOutcome::Skipped
        ));
    }

    #[test]
    fn test_transpile_leaves_no_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("uptime.toml");
        fs::write(&path, "default = \"uptime\"\n[build]\nname = \"uptime\"\n").unwrap();

        let loader = ModuleLoader::new();
        let LoadOutcome::Loaded(exports) = loader.load(&path, true).unwrap() else {
            panic!("expected exports");
        };
        assert!(exports.is_generated());
        assert_eq!(exports.stem(), "uptime");

        let LoadOutcome::Loaded(direct) = loader.load(&path, false).unwrap() else {
            panic!("expected exports");
        };
        assert!(!direct.is_generated());

        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_failures_carry_path() {
        let dir = TempDir::new().unwrap();
        let loader = ModuleLoader::new();

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "default = [").unwrap();
        let err = loader.load(&broken, true).unwrap_err();
        assert!(matches!(err, LoadError::Transpile { .. }));
        assert_eq!(err.path(), &broken);

        let scalar = dir.path().join("scalar.json");
        fs::write(&scalar, "42").unwrap();
        assert!(matches!(
            loader.load(&scalar, false).unwrap_err(),
            LoadError::Parse { .. }
        ));

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            loader.load(&missing, false).unwrap_err(),
            LoadError::Io { .. }
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
