//! Remote platform boundary.
//!
//! The runtime never talks to the chat service directly; it goes through
//! [`Platform`]. Two implementations ship with the crate: [`HttpPlatform`]
//! for the real REST API and [`DryRunPlatform`], which records calls in
//! memory.

mod dry_run;
mod http;
mod interaction;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigurationError, PlatformError};

pub use dry_run::{DryRunPlatform, RecordedPush, RecordedReply};
pub use http::HttpPlatform;
pub use interaction::{Interaction, InteractionData, OptionEntry};

/// A deployment scope that receives its own command manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetContext {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl TargetContext {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl From<&crate::config::TargetConfig> for TargetContext {
    fn from(config: &crate::config::TargetConfig) -> Self {
        Self::new(config.id.clone(), config.name.clone())
    }
}

/// A response to an interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub content: String,
    #[serde(default)]
    pub ephemeral: bool,
}

impl Reply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: false,
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
        }
    }
}

/// Operations the runtime needs from the remote platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Check the credential and connectivity. Called once at startup.
    async fn verify(&self) -> Result<(), ConfigurationError>;

    /// Targets the application is currently deployed to.
    async fn targets(&self) -> Result<Vec<TargetContext>, PlatformError>;

    /// Commands currently deployed to a target.
    async fn fetch_commands(&self, target: &TargetContext) -> Result<Vec<Value>, PlatformError>;

    /// Replace a target's command set.
    async fn set_commands(
        &self,
        target: &TargetContext,
        commands: Vec<Value>,
    ) -> Result<(), PlatformError>;

    /// Answer an interaction.
    async fn respond(&self, interaction: &Interaction, reply: Reply) -> Result<(), PlatformError>;
}
