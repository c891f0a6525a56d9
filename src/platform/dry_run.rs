//! In-memory platform that records every call.
//!
//! Backs `slashsync run --dry-run`, `check`, `manifest` and the test suite.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Interaction, Platform, Reply, TargetContext};
use crate::error::{ConfigurationError, PlatformError};

/// A `set_commands` call as seen by the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPush {
    pub target_id: String,
    pub commands: Vec<Value>,
}

/// A `respond` call as seen by the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedReply {
    pub interaction_id: String,
    pub command_name: String,
    pub reply: Reply,
}

#[derive(Debug, Default)]
struct DryRunState {
    deployed: HashMap<String, Vec<Value>>,
    pushes: Vec<RecordedPush>,
    replies: Vec<RecordedReply>,
    failing: HashSet<String>,
    fetches: usize,
}

/// Platform double with a fixed target list.
#[derive(Debug, Default)]
pub struct DryRunPlatform {
    targets: Vec<TargetContext>,
    state: Mutex<DryRunState>,
}

impl DryRunPlatform {
    pub fn new(targets: Vec<TargetContext>) -> Self {
        Self {
            targets,
            state: Mutex::new(DryRunState::default()),
        }
    }

    /// Make every push to `target_id` fail until cleared.
    pub fn fail_pushes_for(&self, target_id: impl Into<String>) {
        self.state.lock().failing.insert(target_id.into());
    }

    pub fn clear_failures(&self) {
        self.state.lock().failing.clear();
    }

    /// Every push so far, in call order, failed ones included.
    pub fn pushes(&self) -> Vec<RecordedPush> {
        self.state.lock().pushes.clone()
    }

    pub fn push_count(&self) -> usize {
        self.state.lock().pushes.len()
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetches
    }

    pub fn replies(&self) -> Vec<RecordedReply> {
        self.state.lock().replies.clone()
    }

    /// Commands most recently accepted for a target.
    pub fn deployed(&self, target_id: &str) -> Option<Vec<Value>> {
        self.state.lock().deployed.get(target_id).cloned()
    }

    pub fn target(&self, id_or_name: &str) -> Option<&TargetContext> {
        self.targets
            .iter()
            .find(|t| t.id == id_or_name)
            .or_else(|| self.targets.iter().find(|t| t.name == id_or_name))
    }
}

#[async_trait]
impl Platform for DryRunPlatform {
    async fn verify(&self) -> Result<(), ConfigurationError> {
        Ok(())
    }

    async fn targets(&self) -> Result<Vec<TargetContext>, PlatformError> {
        Ok(self.targets.clone())
    }

    async fn fetch_commands(&self, target: &TargetContext) -> Result<Vec<Value>, PlatformError> {
        let mut state = self.state.lock();
        state.fetches += 1;
        Ok(state.deployed.get(&target.id).cloned().unwrap_or_default())
    }

    async fn set_commands(
        &self,
        target: &TargetContext,
        commands: Vec<Value>,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        state.pushes.push(RecordedPush {
            target_id: target.id.clone(),
            commands: commands.clone(),
        });

        if state.failing.contains(&target.id) {
            return Err(PlatformError::Status {
                status: 400,
                body: format!("rejected command set for {}", target.id),
            });
        }

        crate::debug_event!("dry-run", "set commands", "{} -> {}", target.id, commands.len());
        state.deployed.insert(target.id.clone(), commands);
        Ok(())
    }

    async fn respond(&self, interaction: &Interaction, reply: Reply) -> Result<(), PlatformError> {
        crate::debug_event!("dry-run", "reply", "{}: {}", interaction.command_name, reply.content);
        self.state.lock().replies.push(RecordedReply {
            interaction_id: interaction.id.clone(),
            command_name: interaction.command_name.clone(),
            reply,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_records_pushes_and_failures() {
        let platform = DryRunPlatform::new(vec![
            TargetContext::new("g1", "One"),
            TargetContext::new("g2", "Two"),
        ]);
        let g1 = platform.target("g1").unwrap().clone();
        let g2 = platform.target("Two").unwrap().clone();

        platform.set_commands(&g1, vec![json!({"name": "ping"})]).await.unwrap();
        platform.fail_pushes_for("g2");
        assert!(platform.set_commands(&g2, vec![]).await.is_err());

        assert_eq!(platform.push_count(), 2);
        assert_eq!(platform.deployed("g1").unwrap(), vec![json!({"name": "ping"})]);
        assert!(platform.deployed("g2").is_none());
        assert_eq!(platform.fetch_commands(&g1).await.unwrap().len(), 1);
        assert_eq!(platform.fetch_count(), 1);
    }
}
