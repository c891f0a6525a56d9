//! Error types for the change watcher.

use thiserror::Error;

/// Lifecycle guard violations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchError {
    #[error("Watcher is already polling")]
    AlreadyPolling,

    #[error("Watcher is not polling")]
    NotPolling,
}
