use std::process::Command;
use tempfile::TempDir;

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let output = Command::new(env!("CARGO_BIN_EXE_slashsync"))
        .arg("init")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run init command");

    assert!(output.status.success());

    let config_path = temp_path.join("slashsync.toml");
    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("version = 1"));
    assert!(content.contains("[units]"));
    assert!(content.contains("[watcher]"));
    assert!(temp_path.join("commands").is_dir());
    assert!(temp_path.join("events").is_dir());

    // A second init without --force refuses to overwrite
    let output = Command::new(env!("CARGO_BIN_EXE_slashsync"))
        .arg("init")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run init command");
    assert!(!output.status.success());
}

#[test]
fn test_check_and_manifest_commands() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();
    let commands = temp_path.join("commands");
    std::fs::create_dir_all(&commands).unwrap();
    std::fs::create_dir_all(temp_path.join("events")).unwrap();
    std::fs::write(
        commands.join("ping.toml"),
        "default = [{ name = \"ping\", description = \"Replies with Pong!\" }, \"ping\"]\n",
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_slashsync"))
        .arg("check")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run check command");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ping.toml"));
    assert!(stdout.contains("/ping"));

    let output = Command::new(env!("CARGO_BIN_EXE_slashsync"))
        .args(["manifest", "local"])
        .current_dir(temp_path)
        .output()
        .expect("Failed to run manifest command");
    assert!(output.status.success());
    let manifest: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(manifest[0]["name"], "ping");

    // No transient files are left behind
    let leftovers: Vec<_> = std::fs::read_dir(&commands)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with('_'))
        .collect();
    assert!(leftovers.is_empty());
}
