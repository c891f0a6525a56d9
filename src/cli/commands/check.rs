//! Check command - load every unit and report validation results.

use std::path::Path;

use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};

use crate::client::Client;
use crate::config::Settings;
use crate::loader::{HandlerNormalizer, UnitLoader, list_units, normalize_path};
use crate::unit::{Bindings, Handler, HandlerKind, HandlerRecord};

/// One row of the check report.
#[derive(Debug)]
pub struct CheckRow {
    pub kind: HandlerKind,
    pub file: String,
    pub result: Result<String, String>,
}

/// Load both unit directories without registering anything or touching the
/// network.
pub fn check_units(settings: &Settings, bindings: Bindings) -> Vec<CheckRow> {
    let client = Client::new(super::dry_run_platform(settings));
    let units = UnitLoader::new(HandlerNormalizer::new(bindings, client));
    let transpile = settings.units.transpile;

    let mut rows = Vec::new();
    for (kind, dir) in [
        (HandlerKind::Command, &settings.units.commands_dir),
        (HandlerKind::Event, &settings.units.events_dir),
    ] {
        for path in list_units(&normalize_path(dir)) {
            let result = match units.load_unit(kind, &path, transpile) {
                Ok(Some(record)) => Ok(summary(&record)),
                Ok(None) => continue,
                Err(e) => Err(e.to_string()),
            };
            rows.push(CheckRow {
                kind,
                file: display_name(&path),
                result,
            });
        }
    }
    rows
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn summary(record: &HandlerRecord) -> String {
    match record.handler() {
        Handler::Command(command) => match command.descriptor.as_static() {
            Some(descriptor) => format!("/{}", descriptor.name),
            None => "per-target descriptor".to_string(),
        },
        Handler::Event(event) => format!("{} ({})", event.event, event.mode.as_str()),
    }
}

/// Run the check command. Exits with status 1 if any unit failed.
pub fn run(settings: &Settings, bindings: Bindings) {
    let rows = check_units(settings, bindings);
    if rows.is_empty() {
        println!(
            "No units found in {} or {}",
            settings.units.commands_dir.display(),
            settings.units.events_dir.display()
        );
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Kind", "File", "Status", "Detail"]);

    let mut failures = 0;
    for row in &rows {
        let (status, detail) = match &row.result {
            Ok(detail) => (Cell::new("ok").fg(Color::Green), detail.clone()),
            Err(error) => {
                failures += 1;
                (Cell::new("error").fg(Color::Red), error.clone())
            }
        };
        table.add_row(vec![
            Cell::new(row.kind.as_str()),
            Cell::new(&row.file),
            status,
            Cell::new(detail),
        ]);
    }

    println!("{table}");
    println!("{} units, {failures} failed", rows.len());
    if failures > 0 {
        std::process::exit(1);
    }
}
