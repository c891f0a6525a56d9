//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod check;
pub mod init;
pub mod manifest;
pub mod run;

use std::sync::Arc;

use crate::config::Settings;
use crate::platform::{DryRunPlatform, TargetContext};

/// In-memory platform serving the configured dry-run targets.
pub fn dry_run_platform(settings: &Settings) -> Arc<DryRunPlatform> {
    let targets = settings
        .platform
        .dry_run_targets
        .iter()
        .map(TargetContext::from)
        .collect();
    Arc::new(DryRunPlatform::new(targets))
}
