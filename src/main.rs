use std::path::PathBuf;

use clap::Parser;

use slashsync::Settings;
use slashsync::builtins;
use slashsync::cli::commands::{check, init, manifest, run};
use slashsync::cli::{Cli, Commands};

/// Load settings from `--config` or the default file and set up logging.
fn load_settings(config: Option<PathBuf>) -> Settings {
    let settings = match config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        Settings::default()
    });

    slashsync::logging::init_with_config(&settings.logging);
    settings
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => init::run_init(force),
        Commands::Run { dry_run, no_watch } => {
            let settings = load_settings(cli.config);
            run::run(run::RunArgs { dry_run, no_watch }, settings, builtins::bindings()).await;
        }
        Commands::Check => {
            let settings = load_settings(cli.config);
            check::run(&settings, builtins::bindings());
        }
        Commands::Manifest { target } => {
            let settings = load_settings(cli.config);
            manifest::run(&settings, builtins::bindings(), &target).await;
        }
    }
}
