//! Executors and listeners shipped with the binary.
//!
//! Unit files under `demos/units` refer to these by name.

use std::sync::Arc;

use crate::client::Client;
use crate::dispatch::Invocation;
use crate::events::EventContext;
use crate::platform::{Reply, TargetContext};
use crate::unit::{
    Bindings, CommandDescriptor, CommandExecutor, CommandType, CommandUnit, DescriptorSource,
    executor,
};

pub fn bindings() -> Bindings {
    Bindings::new()
        .with_executor("ping", ping)
        .with_executor("uptime", uptime)
        .with_executor("echo", echo)
        .with_executor("greet", greet)
        .with_listener("ready", ready)
        .with_listener("log_message", log_message)
        .with_builder("greeting", greeting)
        .with_factory("avatar", |client: &Client| {
            Arc::new(AvatarCommand {
                client: client.clone(),
            }) as Arc<dyn CommandUnit>
        })
}

async fn ping(invocation: Invocation) -> anyhow::Result<()> {
    invocation.reply(Reply::new("Pong!")).await?;
    Ok(())
}

async fn uptime(invocation: Invocation) -> anyhow::Result<()> {
    let secs = invocation.client.uptime().as_secs();
    let text = format!(
        "Up for {}d {}h {}m {}s",
        secs / 86_400,
        secs % 86_400 / 3_600,
        secs % 3_600 / 60,
        secs % 60
    );
    invocation.reply(Reply::new(text)).await?;
    Ok(())
}

async fn echo(invocation: Invocation) -> anyhow::Result<()> {
    let text = invocation
        .arg_str("text")
        .ok_or_else(|| anyhow::anyhow!("missing 'text' argument"))?
        .to_string();
    let ephemeral = invocation
        .arg("ephemeral")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    let reply = if ephemeral {
        Reply::ephemeral(text)
    } else {
        Reply::new(text)
    };
    invocation.reply(reply).await?;
    Ok(())
}

async fn greet(invocation: Invocation) -> anyhow::Result<()> {
    let user = invocation.interaction.invoker_id.clone();
    invocation.reply(Reply::new(format!("Hello <@{user}>!"))).await?;
    Ok(())
}

/// One descriptor per target, named after it.
fn greeting(target: &TargetContext) -> Option<CommandDescriptor> {
    let place = if target.name.is_empty() {
        "this server"
    } else {
        target.name.as_str()
    };
    Some(CommandDescriptor::slash(
        "hello",
        format!("Say hello to {place}"),
    ))
}

async fn ready(ctx: EventContext) -> anyhow::Result<()> {
    crate::log_event!("event", "ready", "serving after {:?}", ctx.client.uptime());
    Ok(())
}

async fn log_message(ctx: EventContext) -> anyhow::Result<()> {
    let content = ctx
        .payload
        .get("content")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    crate::debug_event!("event", ctx.name, "{content}");
    Ok(())
}

/// User context-menu command replying with the target's avatar.
struct AvatarCommand {
    client: Client,
}

impl CommandUnit for AvatarCommand {
    fn build(&self) -> DescriptorSource {
        DescriptorSource::Static(CommandDescriptor::context_menu(
            CommandType::User,
            "Show Avatar",
        ))
    }

    fn executor(self: Arc<Self>) -> CommandExecutor {
        CommandExecutor::Function(executor(move |invocation: Invocation| {
            let this = self.clone();
            async move {
                let target = invocation.target.clone().unwrap_or_default();
                let avatar = target
                    .get("avatar_url")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
                    .or_else(|| {
                        let id = target.get("id")?.as_str()?;
                        let hash = target.get("avatar")?.as_str()?;
                        Some(format!("https://cdn.discordapp.com/avatars/{id}/{hash}.png"))
                    })
                    .ok_or_else(|| anyhow::anyhow!("target has no avatar"))?;
                this.client
                    .reply(&invocation.interaction, Reply::ephemeral(avatar))
                    .await?;
                Ok::<(), anyhow::Error>(())
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_registered() {
        let bindings = bindings();
        for name in ["ping", "uptime", "echo", "greet"] {
            assert!(bindings.executor(name).is_some(), "{name}");
        }
        assert!(bindings.listener("ready").is_some());
        assert!(bindings.listener("log_message").is_some());
        assert!(bindings.factory("avatar").is_some());

        let build = bindings.builder("greeting").unwrap();
        let descriptor = build(&TargetContext::new("1", "Rustaceans")).unwrap();
        assert_eq!(descriptor.description, "Say hello to Rustaceans");
        assert!(descriptor.validate().is_ok());
    }
}
