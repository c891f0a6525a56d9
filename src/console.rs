//! Line-oriented operator console.
//!
//! Independent of the runtime lifecycle: the binary registers commands that
//! close over whatever they need and feeds lines from stdin.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Whether the console keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleFlow {
    Continue,
    Quit,
}

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Command '{0}' is already registered")]
    Duplicate(String),

    #[error("Unknown command '{0}'. Type 'help' for a list.")]
    Unknown(String),

    #[error("{name}: {source:#}")]
    Handler {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type ConsoleHandler =
    Arc<dyn Fn(Vec<String>) -> BoxFuture<'static, anyhow::Result<ConsoleFlow>> + Send + Sync>;

struct Entry {
    aliases: Vec<String>,
    summary: String,
    handler: ConsoleHandler,
}

#[derive(Default)]
pub struct Console {
    commands: IndexMap<String, Entry>,
    aliases: IndexMap<String, String>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command under `name` and `aliases`.
    pub fn register<F, Fut>(
        &mut self,
        name: &str,
        aliases: &[&str],
        summary: &str,
        handler: F,
    ) -> Result<(), ConsoleError>
    where
        F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ConsoleFlow>> + Send + 'static,
    {
        for key in std::iter::once(&name).chain(aliases) {
            if self.resolve(key).is_some() {
                return Err(ConsoleError::Duplicate(key.to_string()));
            }
        }

        for alias in aliases {
            self.aliases.insert(alias.to_string(), name.to_string());
        }
        self.commands.insert(
            name.to_string(),
            Entry {
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
                summary: summary.to_string(),
                handler: Arc::new(move |args| Box::pin(handler(args))),
            },
        );
        Ok(())
    }

    fn resolve(&self, key: &str) -> Option<&str> {
        if let Some((name, _)) = self.commands.get_key_value(key) {
            return Some(name.as_str());
        }
        self.aliases.get(key).map(String::as_str)
    }

    /// One line per command, in registration order.
    pub fn help_text(&self) -> String {
        self.commands
            .iter()
            .map(|(name, entry)| {
                let names = if entry.aliases.is_empty() {
                    name.clone()
                } else {
                    format!("{name} ({})", entry.aliases.join(", "))
                };
                format!("  {names:<24} {}", entry.summary)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Run one input line. Empty lines are ignored; a leading `:` is stripped.
    pub async fn run(&self, line: &str) -> Result<ConsoleFlow, ConsoleError> {
        let line = line.trim();
        let line = line.strip_prefix(':').unwrap_or(line);
        let mut words = line.split_whitespace().map(str::to_string);
        let Some(word) = words.next() else {
            return Ok(ConsoleFlow::Continue);
        };

        let name = self
            .resolve(&word)
            .ok_or_else(|| ConsoleError::Unknown(word.clone()))?
            .to_string();
        let handler = self.commands[&name].handler.clone();

        handler(words.collect())
            .await
            .map_err(|source| ConsoleError::Handler { name, source })
    }

    /// Read lines until `quit` or end of input.
    pub async fn serve<R>(&self, reader: R)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("[console] read failed: {e}");
                    break;
                }
            };
            match self.run(&line).await {
                Ok(ConsoleFlow::Quit) => break,
                Ok(ConsoleFlow::Continue) => {}
                Err(e) => eprintln!("{e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_aliases_prefix_and_unknown() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut console = Console::new();
        let sink = seen.clone();
        console
            .register("invalidate", &["inv"], "Forget a target", move |args| {
                let sink = sink.clone();
                async move {
                    sink.lock().extend(args);
                    Ok(ConsoleFlow::Continue)
                }
            })
            .unwrap();
        console
            .register("quit", &["exit"], "Leave", |_| async { Ok(ConsoleFlow::Quit) })
            .unwrap();

        assert_eq!(console.run(":inv g1").await.unwrap(), ConsoleFlow::Continue);
        assert_eq!(console.run("  ").await.unwrap(), ConsoleFlow::Continue);
        assert_eq!(console.run("exit").await.unwrap(), ConsoleFlow::Quit);
        assert!(matches!(
            console.run("nope").await,
            Err(ConsoleError::Unknown(name)) if name == "nope"
        ));
        assert_eq!(*seen.lock(), vec!["g1".to_string()]);
        assert!(console.help_text().contains("invalidate (inv)"));
    }

    #[tokio::test]
    async fn test_duplicates_rejected() {
        let mut console = Console::new();
        console
            .register("push", &["p"], "Push", |_| async { Ok(ConsoleFlow::Continue) })
            .unwrap();
        assert!(matches!(
            console.register("p", &[], "Other", |_| async { Ok(ConsoleFlow::Continue) }),
            Err(ConsoleError::Duplicate(_))
        ));
        assert!(matches!(
            console.register("list", &["push"], "Other", |_| async { Ok(ConsoleFlow::Continue) }),
            Err(ConsoleError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_handler_error_is_wrapped() {
        let mut console = Console::new();
        console
            .register("fail", &[], "Fails", |_| async { Err(anyhow::anyhow!("nope")) })
            .unwrap();
        let err = console.run("fail").await.unwrap_err();
        assert_eq!(err.to_string(), "fail: nope");

        let input: &[u8] = b"fail\nquit\n";
        console.serve(input).await;
    }
}
