//! Manifest command - print what a sweep would push to one target.

use crate::bot::Bot;
use crate::config::Settings;
use crate::unit::Bindings;

/// Realize the manifest for `target` (id or name) as pretty JSON.
pub async fn render(settings: &Settings, bindings: Bindings, target: &str) -> Result<String, String> {
    let platform = super::dry_run_platform(settings);
    let Some(context) = platform.target(target).cloned() else {
        let known: Vec<&str> = settings
            .platform
            .dry_run_targets
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        return Err(format!(
            "Unknown target '{target}'. Configured targets: {}",
            known.join(", ")
        ));
    };

    let bot = Bot::new(settings.clone(), platform, bindings);
    let report = bot
        .register_commands(&settings.units.commands_dir, settings.units.transpile, false)
        .await;
    for error in &report.failed {
        eprintln!("skipped: {error}");
    }

    let manifest = bot.synchronizer().realize(&context);
    serde_json::to_string_pretty(&manifest.commands()).map_err(|e| e.to_string())
}

pub async fn run(settings: &Settings, bindings: Bindings, target: &str) {
    match render(settings, bindings, target).await {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_render_per_target_manifest() {
        let dir = TempDir::new().unwrap();
        let commands = dir.path().join("commands");
        fs::create_dir_all(&commands).unwrap();
        fs::write(
            commands.join("hello.json"),
            r#"{"default": "greet", "build": {"builder": "greeting"}}"#,
        )
        .unwrap();

        let mut settings = Settings::default();
        settings.units.commands_dir = commands;
        settings.platform.dry_run_targets = vec![TargetConfig {
            id: "g1".to_string(),
            name: "Rustaceans".to_string(),
        }];

        let json = render(&settings, crate::builtins::bindings(), "Rustaceans")
            .await
            .unwrap();
        let commands: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(commands[0]["name"], "hello");
        assert_eq!(commands[0]["description"], "Say hello to Rustaceans");

        assert!(render(&settings, crate::builtins::bindings(), "nope").await.is_err());
    }
}
