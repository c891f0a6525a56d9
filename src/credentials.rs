//! Credential lookup and persistence.
//!
//! The credential lives in an environment variable (name from
//! `platform.token_env`). A local env file is consulted when the variable is
//! unset, and a prompted credential is written back into that file.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use crate::config::PlatformConfig;

/// Read an env file without touching the process environment. A missing
/// file yields an empty map.
pub fn load_env_file(path: &Path) -> Result<HashMap<String, String>, dotenvy::Error> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => return Ok(HashMap::new()),
        Err(e) => return Err(e),
    };
    iter.collect()
}

/// Credential from the process environment, falling back to the env file.
pub fn resolve(config: &PlatformConfig) -> Option<String> {
    if let Ok(token) = std::env::var(&config.token_env) {
        if !token.trim().is_empty() {
            return Some(token);
        }
    }

    match load_env_file(&config.env_file) {
        Ok(mut vars) => vars
            .remove(&config.token_env)
            .filter(|token| !token.trim().is_empty()),
        Err(e) => {
            tracing::warn!(
                "[credentials] could not read {}: {e}",
                config.env_file.display()
            );
            None
        }
    }
}

/// Write `key=token` into the env file, replacing an existing assignment of
/// `key` or appending one. Other lines are preserved.
pub fn persist_token(path: &Path, key: &str, token: &str) -> io::Result<()> {
    let existing = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };

    let assignment = format!("{key}={token}");
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            let is_key = trimmed
                .split_once('=')
                .is_some_and(|(k, _)| k.trim() == key);
            if is_key && !replaced {
                replaced = true;
                assignment.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !replaced {
        lines.push(assignment);
    }

    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content)
}

/// Ask for the credential on the terminal without echoing it.
pub fn prompt_token(key: &str) -> io::Result<String> {
    let term = console::Term::stderr();
    term.write_line(&format!("{key} is not set."))?;
    loop {
        term.write_str(&format!("Enter {key}: "))?;
        let token = term.read_secure_line()?;
        let token = token.trim();
        if !token.is_empty() {
            return Ok(token.to_string());
        }
    }
}
