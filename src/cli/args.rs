//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Hot-reloading command handler runtime
#[derive(Parser)]
#[command(
    name = "slashsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Hot-reloading command handler runtime",
    long_about = "Load command and event units from disk, keep them live while files change, and push per-target command manifests only when they differ.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ slashsync init                 # Write slashsync.toml and unit directories\n  $ slashsync check                # Validate every unit without network\n  $ slashsync run --dry-run        # Serve against the in-memory platform\n  $ slashsync manifest local       # Print what would be pushed to a target"
)]
pub struct Cli {
    /// Path to custom slashsync.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Write a default slashsync.toml and create unit directories")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Run the bot
    #[command(
        about = "Load units, synchronize manifests and serve",
        after_help = "Console commands (type 'help' once running):\n  list, push, invalidate <target>, watch start|stop,\n  invoke <target> <command> [options-json], quit"
    )]
    Run {
        /// Use the in-memory platform with the configured dry-run targets
        #[arg(long)]
        dry_run: bool,

        /// Do not start the change watcher
        #[arg(long)]
        no_watch: bool,
    },

    /// Validate every unit without touching the network
    #[command(about = "Load all units and report validation results")]
    Check,

    /// Print a realized manifest
    #[command(about = "Print the command manifest realized for a target")]
    Manifest {
        /// Target id or name from platform.dry_run_targets
        target: String,
    },
}
