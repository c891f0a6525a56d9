//! Error taxonomy for unit processing, synchronization and startup.
//!
//! Only [`ConfigurationError`] is fatal, and only at startup. Everything
//! else is logged by the component that hit it and processing continues.

use std::path::PathBuf;
use thiserror::Error;

/// Reading, transpiling or evaluating a unit file failed.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot transpile {path}: {reason}")]
    Transpile { path: PathBuf, reason: String },

    #[error("Cannot evaluate {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

impl LoadError {
    pub fn path(&self) -> &PathBuf {
        match self {
            LoadError::Io { path, .. }
            | LoadError::Transpile { path, .. }
            | LoadError::Parse { path, .. } => path,
        }
    }
}

/// A loaded unit does not reduce to a usable handler record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Builder not found.")]
    BuilderNotFound,

    #[error("Executor not found.")]
    ExecutorNotFound,

    #[error("Invalid command structure.")]
    InvalidStructure,

    #[error("Unknown {kind} binding '{name}'")]
    UnknownBinding { kind: &'static str, name: String },

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),
}

/// Why a single unit could not be admitted.
#[derive(Error, Debug)]
pub enum UnitError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("{path}: {source}")]
    Validation {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },
}

impl UnitError {
    pub fn path(&self) -> &PathBuf {
        match self {
            UnitError::Load(e) => e.path(),
            UnitError::Validation { path, .. } => path,
        }
    }
}

pub type UnitResult<T> = Result<T, UnitError>;

/// Remote platform call failed.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("No credential has been supplied")]
    MissingCredential,

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Platform answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Unknown target: {0}")]
    UnknownTarget(String),
}

/// Startup could not establish a working session with the platform.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid token!")]
    InvalidToken,

    #[error(
        "Is the platform down?\nhttps://discordstatus.com\nhttps://downdetector.com/status/discord"
    )]
    Unreachable,

    #[error("Connection has been reset.")]
    ConnectionReset,

    #[error("Failed to log in! Error code: {0}")]
    Other(String),
}
