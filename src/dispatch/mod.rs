//! Inbound interaction routing.

pub mod args;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;

use crate::client::Client;
use crate::error::PlatformError;
use crate::platform::{Interaction, InteractionData, Reply};
use crate::sync::ManifestSynchronizer;

pub use args::ArgumentError;

/// Generic notice sent when an executor fails.
pub const FAILURE_NOTICE: &str = "An error occurred while executing this command. Please try later.";

/// Everything an executor is called with.
#[derive(Clone)]
pub struct Invocation {
    pub client: Client,
    pub interaction: Arc<Interaction>,
    /// Resolved arguments, narrowed to the selected group and subcommand.
    pub args: Value,
    pub group: Option<String>,
    pub sub: Option<String>,
    /// The user or message a context-menu command was used on.
    pub target: Option<Value>,
}

impl Invocation {
    pub async fn reply(&self, reply: Reply) -> Result<(), PlatformError> {
        self.client.reply(&self.interaction, reply).await
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    pub fn arg_str(&self, name: &str) -> Option<&str> {
        self.arg(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Executed,
    /// No command with that name exists on the originating target.
    UnknownCommand,
    /// The executor map has no entry for the selected group/subcommand.
    NoRoute,
    /// The executor failed; the invoker got the generic notice.
    Failed(String),
}

pub struct InteractionDispatcher {
    client: Client,
    sync: Arc<ManifestSynchronizer>,
}

impl InteractionDispatcher {
    pub fn new(client: Client, sync: Arc<ManifestSynchronizer>) -> Self {
        Self { client, sync }
    }

    pub async fn dispatch(&self, interaction: Interaction) -> DispatchOutcome {
        let Some((record, _)) = self
            .sync
            .resolve_command(&interaction.target_id, &interaction.command_name)
            .await
        else {
            crate::debug_event!(
                "dispatch",
                "unknown command",
                "{} on {}",
                interaction.command_name,
                interaction.target_id
            );
            return DispatchOutcome::UnknownCommand;
        };
        let Some(command) = record.as_command() else {
            return DispatchOutcome::UnknownCommand;
        };

        let interaction = Arc::new(interaction);
        let (group, sub) = {
            let (g, s) = interaction.selectors();
            (g.map(str::to_string), s.map(str::to_string))
        };

        let (args, target) = match &interaction.data {
            InteractionData::ChatInput { options } => match args::resolve(options) {
                Ok(resolved) => (args::narrow(resolved, group.as_deref(), sub.as_deref()), None),
                Err(e) => return self.fail(&interaction, e.to_string()).await,
            },
            InteractionData::ContextMenu { target } => (Value::Null, Some(target.clone())),
        };

        let Some(executor) = command.executor.route(group.as_deref(), sub.as_deref()) else {
            crate::debug_event!(
                "dispatch",
                "no route",
                "{} {:?} {:?}",
                interaction.command_name,
                group,
                sub
            );
            return DispatchOutcome::NoRoute;
        };

        let invocation = Invocation {
            client: self.client.clone(),
            interaction: interaction.clone(),
            args,
            group,
            sub,
            target,
        };

        match AssertUnwindSafe(executor(invocation)).catch_unwind().await {
            Ok(Ok(())) => DispatchOutcome::Executed,
            Ok(Err(e)) => self.fail(&interaction, format!("{e:#}")).await,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "executor panicked".to_string());
                self.fail(&interaction, reason).await
            }
        }
    }

    async fn fail(&self, interaction: &Interaction, reason: String) -> DispatchOutcome {
        tracing::error!(
            "An error occurred while executing the command: {}, user: {}: {reason}",
            interaction.command_name,
            interaction.invoker_id
        );
        if let Err(e) = self
            .client
            .reply(interaction, Reply::ephemeral(FAILURE_NOTICE))
            .await
        {
            tracing::warn!("[dispatch] could not send failure notice: {e}");
        }
        DispatchOutcome::Failed(reason)
    }
}
