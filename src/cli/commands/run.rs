//! Run command - start the bot and the operator console.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, bail};
use serde_json::Value;
use tokio::io::BufReader;

use crate::bot::Bot;
use crate::config::Settings;
use crate::console::{Console, ConsoleError, ConsoleFlow};
use crate::credentials;
use crate::platform::{DryRunPlatform, HttpPlatform, Interaction, OptionEntry, Platform};
use crate::unit::{Bindings, HandlerKind, HandlerRecord};
use crate::watcher::WatchError;

pub struct RunArgs {
    pub dry_run: bool,
    pub no_watch: bool,
}

/// Run the bot until `quit`, end of input or Ctrl-C.
pub async fn run(args: RunArgs, mut settings: Settings, bindings: Bindings) {
    if args.no_watch {
        settings.watcher.enabled = false;
    }

    let (platform, dry_run): (Arc<dyn Platform>, Option<Arc<DryRunPlatform>>) = if args.dry_run {
        let platform = super::dry_run_platform(&settings);
        (platform.clone(), Some(platform))
    } else {
        match http_platform(&settings).await {
            Ok(platform) => (Arc::new(platform), None),
            Err(e) => {
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
        }
    };

    let bot = Arc::new(Bot::new(settings, platform, bindings));
    if let Err(e) = bot.start().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
    bot.emit_event("ready", Value::Null).await;

    let console = match build_console(bot.clone(), dry_run) {
        Ok(console) => console,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    eprintln!(
        "slashsync running: {} commands, {} events. Type 'help' for console commands.",
        bot.commands().len(),
        bot.events().len()
    );

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        _ = console.serve(stdin) => {}
        _ = tokio::signal::ctrl_c() => eprintln!(),
    }

    stop_watcher(&bot);
}

/// Stop polling if it is running. An idle watcher is fine at shutdown.
fn stop_watcher(bot: &Bot) {
    match bot.stop_watching() {
        Ok(()) | Err(WatchError::NotPolling) => {}
        Err(e) => tracing::debug!("[watcher] stop on shutdown: {e}"),
    }
}

/// HTTP platform with the credential from the environment, the env file or
/// an interactive prompt. A prompted credential is persisted to the env file.
async fn http_platform(settings: &Settings) -> anyhow::Result<HttpPlatform> {
    let config = settings.platform.clone();
    let platform = HttpPlatform::new(&config).context("failed to build HTTP client")?;

    let token = match credentials::resolve(&config) {
        Some(token) => token,
        None => {
            let key = config.token_env.clone();
            let token = tokio::task::spawn_blocking(move || credentials::prompt_token(&key))
                .await
                .context("credential prompt panicked")?
                .context("failed to read credential")?;
            credentials::persist_token(&config.env_file, &config.token_env, &token)
                .with_context(|| format!("failed to write {}", config.env_file.display()))?;
            crate::log_event!("credentials", "saved", "{}", config.env_file.display());
            token
        }
    };

    platform.set_token(token);
    Ok(platform)
}

fn describe(record: &HandlerRecord) -> String {
    let detail = match (record.as_command(), record.as_event()) {
        (Some(command), _) => command
            .descriptor
            .as_static()
            .map(|d| format!("/{}", d.name))
            .unwrap_or_else(|| "per-target".to_string()),
        (_, Some(event)) => format!("{} ({})", event.event, event.mode.as_str()),
        _ => String::new(),
    };
    format!("  {:<24} {}", detail, record.source_path().display())
}

/// Console wired to a running bot.
pub fn build_console(
    bot: Arc<Bot>,
    dry_run: Option<Arc<DryRunPlatform>>,
) -> Result<Console, ConsoleError> {
    let mut console = Console::new();

    let b = bot.clone();
    console.register("list", &["ls"], "List registered commands and events", move |_| {
        let bot = b.clone();
        async move {
            println!("Commands:");
            for record in bot.commands() {
                println!("{}", describe(&record));
            }
            println!("Events:");
            for record in bot.events() {
                println!("{}", describe(&record));
            }
            Ok::<_, anyhow::Error>(ConsoleFlow::Continue)
        }
    })?;

    let b = bot.clone();
    console.register("push", &["sync"], "Push manifests to every target", move |_| {
        let bot = b.clone();
        async move {
            let report = bot.broadcast_commands().await?;
            for (target, outcome) in &report.outcomes {
                println!("  {target}: {outcome:?}");
            }
            println!(
                "{} pushed, {} aliased, {} unchanged, {} failed",
                report.pushed(),
                report.aliased(),
                report.unchanged(),
                report.failed()
            );
            Ok::<_, anyhow::Error>(ConsoleFlow::Continue)
        }
    })?;

    let b = bot.clone();
    console.register(
        "invalidate",
        &["inv"],
        "Forget a target's cached manifest: invalidate <target>",
        move |args| {
            let bot = b.clone();
            async move {
                let [target] = args.as_slice() else {
                    bail!("usage: invalidate <target>");
                };
                if bot.invalidate(target).await {
                    println!("Invalidated {target}; the next push will resend it.");
                } else {
                    println!("Nothing cached for {target}.");
                }
                Ok::<_, anyhow::Error>(ConsoleFlow::Continue)
            }
        },
    )?;

    let b = bot.clone();
    console.register("watch", &[], "Control the change watcher: watch start|stop", move |args| {
        let bot = b.clone();
        async move {
            match args.first().map(String::as_str) {
                Some("start") => bot.start_watching()?,
                Some("stop") => bot.stop_watching()?,
                None => {}
                Some(other) => bail!("usage: watch start|stop (got '{other}')"),
            }
            println!("Watcher is {:?}", bot.watcher().state());
            Ok::<_, anyhow::Error>(ConsoleFlow::Continue)
        }
    })?;

    let b = bot.clone();
    let sequence = Arc::new(AtomicU64::new(1));
    console.register(
        "invoke",
        &["call"],
        "Simulate an interaction: invoke <target> <command> [options-json]",
        move |args| {
            let bot = b.clone();
            let dry_run = dry_run.clone();
            let id = format!("console-{}", sequence.fetch_add(1, Ordering::Relaxed));
            async move {
                let [target, command, rest @ ..] = args.as_slice() else {
                    bail!("usage: invoke <target> <command> [options-json]");
                };
                let options: Vec<OptionEntry> = if rest.is_empty() {
                    Vec::new()
                } else {
                    serde_json::from_str(&rest.join(" ")).context("invalid options JSON")?
                };

                let mut interaction = Interaction::chat_input(target, command, "console", options);
                interaction.id = id.clone();
                let outcome = bot.handle_interaction(interaction).await;
                println!("{outcome:?}");

                if let Some(platform) = dry_run {
                    for reply in platform.replies().iter().filter(|r| r.interaction_id == id) {
                        let scope = if reply.reply.ephemeral { " (ephemeral)" } else { "" };
                        println!("  reply{scope}: {}", reply.reply.content);
                    }
                }
                Ok::<_, anyhow::Error>(ConsoleFlow::Continue)
            }
        },
    )?;

    let b = bot.clone();
    console.register(
        "emit",
        &[],
        "Deliver an event to its listeners: emit <event> [payload-json]",
        move |args| {
            let bot = b.clone();
            async move {
                let [event, rest @ ..] = args.as_slice() else {
                    bail!("usage: emit <event> [payload-json]");
                };
                let payload = if rest.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(&rest.join(" ")).context("invalid payload JSON")?
                };
                let delivered = bot.emit_event(event, payload).await;
                println!("Delivered to {delivered} listener(s)");
                Ok::<_, anyhow::Error>(ConsoleFlow::Continue)
            }
        },
    )?;

    let b = bot;
    console.register(
        "unwatch",
        &[],
        "Stop watching a directory: unwatch commands|events <dir>",
        move |args| {
            let bot = b.clone();
            async move {
                let (kind, dir) = match args.as_slice() {
                    [kind, dir] if kind == "commands" => (HandlerKind::Command, dir.clone()),
                    [kind, dir] if kind == "events" => (HandlerKind::Event, dir.clone()),
                    _ => bail!("usage: unwatch commands|events <dir>"),
                };
                let evicted = bot.unwatch(kind, &dir);
                println!("Evicted {} unit(s)", evicted.len());
                Ok::<_, anyhow::Error>(ConsoleFlow::Continue)
            }
        },
    )?;

    console.register("quit", &["exit", "q"], "Stop the bot", |_| async {
        Ok(ConsoleFlow::Quit)
    })?;

    let help = console.help_text();
    console.register("help", &["?"], "Show this list", move |_| {
        let help = help.clone();
        async move {
            println!("{help}");
            println!("  {:<24} Show this list", "help (?)");
            Ok::<_, anyhow::Error>(ConsoleFlow::Continue)
        }
    })?;

    Ok(console)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::TargetContext;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_console_invoke_and_invalidate() {
        let dir = TempDir::new().unwrap();
        let commands = dir.path().join("commands");
        fs::create_dir_all(&commands).unwrap();
        fs::write(
            commands.join("ping.json"),
            r#"{"default": [{"name": "ping", "description": "Replies with Pong!"}, "ping"]}"#,
        )
        .unwrap();

        let mut settings = Settings::default();
        settings.units.commands_dir = commands.clone();
        settings.units.events_dir = dir.path().join("events");
        settings.watcher.enabled = false;

        let platform = Arc::new(DryRunPlatform::new(vec![TargetContext::new("g1", "One")]));
        let bot = Arc::new(Bot::new(
            settings,
            platform.clone(),
            crate::builtins::bindings(),
        ));
        bot.start().await.unwrap();
        assert_eq!(platform.push_count(), 1);

        let console = build_console(bot.clone(), Some(platform.clone())).unwrap();
        assert_eq!(
            console.run("invoke g1 ping").await.unwrap(),
            ConsoleFlow::Continue
        );
        let replies = platform.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].reply.content, "Pong!");

        console.run("push").await.unwrap();
        assert_eq!(platform.push_count(), 1);

        console.run(":inv g1").await.unwrap();
        console.run("push").await.unwrap();
        assert_eq!(platform.push_count(), 2);

        assert!(console.run("invalidate").await.is_err());
        assert_eq!(console.run("q").await.unwrap(), ConsoleFlow::Quit);
    }

    #[tokio::test]
    async fn test_stop_watcher_at_shutdown() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.units.commands_dir = dir.path().join("commands");
        settings.units.events_dir = dir.path().join("events");
        settings.watcher.enabled = false;

        let platform = Arc::new(DryRunPlatform::new(vec![TargetContext::new("g1", "One")]));
        let bot = Bot::new(settings, platform, crate::builtins::bindings());
        bot.start().await.unwrap();

        stop_watcher(&bot);
        assert_eq!(bot.watcher().state(), crate::watcher::WatcherState::Idle);

        bot.start_watching().unwrap();
        stop_watcher(&bot);
        assert_eq!(bot.watcher().state(), crate::watcher::WatcherState::Idle);
        assert_eq!(bot.stop_watching(), Err(WatchError::NotPolling));
    }
}
