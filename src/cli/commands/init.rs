//! Init command.

use std::path::PathBuf;

use crate::config::{SETTINGS_FILE, Settings};

/// Run init command - create configuration file and unit directories.
pub fn run_init(force: bool) {
    let config_path = PathBuf::from(SETTINGS_FILE);

    if config_path.exists() && !force {
        eprintln!(
            "Configuration file already exists at: {}",
            config_path.display()
        );
        eprintln!("Use --force to overwrite");
        std::process::exit(1);
    }

    match Settings::init_config_file(force) {
        Ok(path) => {
            let settings = Settings::default();
            println!("Created configuration file at: {}", path.display());
            println!(
                "Command units go in {}/, event units in {}/.",
                settings.units.commands_dir.display(),
                settings.units.events_dir.display()
            );
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
