//! Tracing setup and the `[component] event: detail` log macros.
//!
//! Every subsystem tags its lines with a short component name so a running
//! bot's output can be followed per concern:
//!
//! | component     | emitted by                                      |
//! |---------------|-------------------------------------------------|
//! | `loader`      | unit file loading and transient TOML transpiles |
//! | `watcher`     | poll ticks: created, updated and deleted units  |
//! | `sync`        | manifest sweeps, pushes, aliasing, failures     |
//! | `dispatch`    | interaction routing                             |
//! | `event`       | event bus deliveries                            |
//! | `credentials` | token lookup and persistence                    |
//! | `bot`         | startup and broadcasts                          |
//! | `console`     | operator console input                          |
//!
//! Levels come from the `[logging]` table of `slashsync.toml`:
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! "slashsync::sync" = "debug"
//! ```
//!
//! `RUST_LOG` replaces the table entirely when set, e.g.
//! `RUST_LOG=slashsync::watcher=trace slashsync run --dry-run`.

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string from configuration.
fn filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.default.clone();
    for (module, level) in &config.modules {
        filter_str.push_str(&format!(",{module}={level}"));
    }
    filter_str
}

/// Initialize logging with configuration.
///
/// Only the first call takes effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_writer(std::io::stderr)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Initialize logging with `LoggingConfig::default()`.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Log a lifecycle event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("watcher", "updated", "{}", path.display());
/// log_event!("sync", "aliased", "{} shares {}'s manifest", target.id, owner);
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("sync", "unchanged", "{}", target.id);
/// debug_event!("dispatch", "no route", "{name} {group:?} {sub:?}");
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_filter_directives_append_modules() {
        let mut modules = BTreeMap::new();
        modules.insert("slashsync::sync".to_string(), "debug".to_string());
        modules.insert("slashsync::watcher".to_string(), "trace".to_string());
        let config = LoggingConfig {
            default: "warn".to_string(),
            modules,
        };

        assert_eq!(
            filter_directives(&config),
            "warn,slashsync::sync=debug,slashsync::watcher=trace"
        );
    }

    #[test]
    fn test_logging_table_from_settings_file() {
        #[derive(serde::Deserialize)]
        struct File {
            logging: LoggingConfig,
        }

        let file: File = toml::from_str(
            "[logging]\ndefault = \"warn\"\n\n[logging.modules]\n\"slashsync::sync\" = \"debug\"\n",
        )
        .unwrap();
        assert_eq!(filter_directives(&file.logging), "warn,slashsync::sync=debug");
    }
}
