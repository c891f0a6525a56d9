use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use slashsync::dispatch::FAILURE_NOTICE;
use slashsync::platform::{DryRunPlatform, OptionEntry};
use slashsync::unit::OptionType;
use slashsync::{Bot, DispatchOutcome, Interaction, Invocation, Settings, TargetContext};
use tempfile::TempDir;

const MATH: &str = r#"{
    "default": {"add": "math_add", "scale": {"double": "math_double"}},
    "build": {
        "name": "math",
        "description": "Arithmetic",
        "options": [
            {"type": 1, "name": "add", "description": "Add two numbers", "options": [
                {"type": 4, "name": "a", "description": "First", "required": true},
                {"type": 4, "name": "b", "description": "Second", "required": true}
            ]},
            {"type": 1, "name": "sub", "description": "Subtract"},
            {"type": 2, "name": "scale", "description": "Scaling", "options": [
                {"type": 1, "name": "double", "description": "Double a number", "options": [
                    {"type": 4, "name": "n", "description": "Number", "required": true}
                ]}
            ]}
        ]
    }
}"#;

struct Fixture {
    _temp: TempDir,
    bot: Bot,
    platform: Arc<DryRunPlatform>,
    seen: Arc<Mutex<Vec<Value>>>,
}

async fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let commands = temp.path().join("commands");
    fs::create_dir_all(&commands).unwrap();
    write(&commands, "ping.json", r#"{"default": [{"name": "ping", "description": "Replies with Pong!"}, "ping"]}"#);
    write(&commands, "math.json", MATH);
    write(&commands, "fail.json", r#"{"default": [{"name": "fail", "description": "Always fails"}, "fail"]}"#);
    write(&commands, "panic.json", r#"{"default": [{"name": "panic", "description": "Always panics"}, "panic"]}"#);
    write(&commands, "avatar.json", r#"{"default": {"unit": "avatar"}}"#);

    let mut settings = Settings::default();
    settings.units.commands_dir = commands;
    settings.units.events_dir = temp.path().join("events");
    settings.watcher.enabled = false;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (add, double) = (seen.clone(), seen.clone());
    let bindings = slashsync::builtins::bindings()
        .with_executor("math_add", move |invocation| {
            let seen = add.clone();
            async move {
                seen.lock().push(invocation.args.clone());
                Ok(())
            }
        })
        .with_executor("math_double", move |invocation| {
            let seen = double.clone();
            async move {
                seen.lock().push(json!({"sub": invocation.sub, "group": invocation.group, "args": invocation.args}));
                Ok(())
            }
        })
        .with_executor("fail", |_| async { Err(anyhow::anyhow!("database offline")) })
        .with_executor("panic", explode);

    let platform = Arc::new(DryRunPlatform::new(vec![TargetContext::new("g1", "One")]));
    let bot = Bot::new(settings, platform.clone(), bindings);
    bot.start().await.unwrap();

    Fixture {
        _temp: temp,
        bot,
        platform,
        seen,
    }
}

async fn explode(_: Invocation) -> anyhow::Result<()> {
    panic!("executor blew up")
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn int(name: &str, value: i64) -> OptionEntry {
    OptionEntry::scalar(OptionType::Integer, name, json!(value))
}

#[tokio::test]
async fn test_ping_replies() {
    let f = fixture().await;
    let outcome = f
        .bot
        .handle_interaction(Interaction::chat_input("g1", "ping", "42", vec![]))
        .await;
    assert_eq!(outcome, DispatchOutcome::Executed);

    let replies = f.platform.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].reply.content, "Pong!");
    assert!(!replies[0].reply.ephemeral);
}

#[tokio::test]
async fn test_unknown_command() {
    let f = fixture().await;
    let outcome = f
        .bot
        .handle_interaction(Interaction::chat_input("g1", "nope", "42", vec![]))
        .await;
    assert_eq!(outcome, DispatchOutcome::UnknownCommand);
    assert!(f.platform.replies().is_empty());
}

#[tokio::test]
async fn test_subcommand_routing_and_arguments() {
    let f = fixture().await;

    let add = OptionEntry::nested(OptionType::Subcommand, "add", vec![int("a", 1), int("b", 2)]);
    let outcome = f
        .bot
        .handle_interaction(Interaction::chat_input("g1", "math", "42", vec![add]))
        .await;
    assert_eq!(outcome, DispatchOutcome::Executed);

    let double = OptionEntry::nested(
        OptionType::SubcommandGroup,
        "scale",
        vec![OptionEntry::nested(OptionType::Subcommand, "double", vec![int("n", 21)])],
    );
    let outcome = f
        .bot
        .handle_interaction(Interaction::chat_input("g1", "math", "42", vec![double]))
        .await;
    assert_eq!(outcome, DispatchOutcome::Executed);

    let seen = f.seen.lock().clone();
    assert_eq!(seen[0], json!({"a": 1, "b": 2}));
    assert_eq!(
        seen[1],
        json!({"sub": "double", "group": "scale", "args": {"n": 21}})
    );

    // Declared but not mapped to an executor
    let sub = OptionEntry::bare(OptionType::Subcommand, "sub");
    let outcome = f
        .bot
        .handle_interaction(Interaction::chat_input("g1", "math", "42", vec![sub]))
        .await;
    assert_eq!(outcome, DispatchOutcome::NoRoute);
}

#[tokio::test]
async fn test_failures_send_generic_ephemeral_notice() {
    let f = fixture().await;

    let outcome = f
        .bot
        .handle_interaction(Interaction::chat_input("g1", "fail", "42", vec![]))
        .await;
    assert_eq!(outcome, DispatchOutcome::Failed("database offline".to_string()));

    let outcome = f
        .bot
        .handle_interaction(Interaction::chat_input("g1", "panic", "42", vec![]))
        .await;
    assert_eq!(outcome, DispatchOutcome::Failed("executor blew up".to_string()));

    let replies = f.platform.replies();
    assert_eq!(replies.len(), 2);
    for reply in replies {
        assert_eq!(reply.reply.content, FAILURE_NOTICE);
        assert!(reply.reply.ephemeral);
    }

    // The runtime keeps serving
    let outcome = f
        .bot
        .handle_interaction(Interaction::chat_input("g1", "ping", "42", vec![]))
        .await;
    assert_eq!(outcome, DispatchOutcome::Executed);
}

#[tokio::test]
async fn test_unsupported_option_type_fails_dispatch() {
    let f = fixture().await;
    let mut odd = int("a", 1);
    odd.kind = 99;
    let outcome = f
        .bot
        .handle_interaction(Interaction::chat_input("g1", "ping", "42", vec![odd]))
        .await;
    assert!(matches!(outcome, DispatchOutcome::Failed(reason) if reason.contains("99")));
}

#[tokio::test]
async fn test_context_menu_unit() {
    let f = fixture().await;
    let interaction = Interaction::context_menu(
        "g1",
        "Show Avatar",
        "42",
        json!({"id": "7", "avatar": "abc"}),
    );
    let outcome = f.bot.handle_interaction(interaction).await;
    assert_eq!(outcome, DispatchOutcome::Executed);

    let replies = f.platform.replies();
    assert_eq!(
        replies[0].reply.content,
        "https://cdn.discordapp.com/avatars/7/abc.png"
    );
    assert!(replies[0].reply.ephemeral);
}
