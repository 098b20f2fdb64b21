//! Startup helpers for the sales assistant shell.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::conversations::{
    ConversationStore, LoadOutcome, StoreConfig, StubResponder, SystemClock, open_slot,
};
use crate::shell::{Flow, Shell};

/// Initialize tracing on stderr, honouring `RUST_LOG` (default `info`).
///
/// Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run the shell (used by the `sales-assistant` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` when stdin closes or `/quit` is entered, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();

    tracing::info!("Starting Sales Assistant v{}", env!("CARGO_PKG_VERSION"));

    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };
    tracing::info!(
        "Storage: {} at {} (key {})",
        config.storage.backend,
        config.storage.path.display(),
        config.storage.key
    );

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(run_session(config)) {
        tracing::error!("Session error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Open storage, load the store and serve stdin until it closes.
///
/// # Errors
/// Returns an error if storage cannot be opened or the terminal fails.
pub async fn run_session(config: StoreConfig) -> anyhow::Result<()> {
    let slot = open_slot(&config.storage)
        .await
        .with_context(|| format!("failed to open {} storage", config.storage.backend))?;
    let store =
        ConversationStore::initialize(slot, Arc::new(SystemClock), config.titles.clone()).await;

    let mut stdout = std::io::stdout();
    match store.load_outcome() {
        LoadOutcome::Corrupt(reason) => writeln!(
            stdout,
            "warning: saved conversations could not be read ({reason}); starting fresh"
        )?,
        LoadOutcome::Unavailable(reason) => {
            writeln!(stdout, "warning: storage unavailable ({reason}); starting fresh")?;
        }
        LoadOutcome::Missing | LoadOutcome::Loaded(_) => {}
    }
    writeln!(stdout, "type /help for commands")?;
    stdout.flush()?;

    let responder = StubResponder::from_config(&config.reply);
    let mut shell = Shell::new(store, Box::new(responder));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let flow = shell.handle_line(&line, &mut stdout).await?;
        stdout.flush()?;
        if flow == Flow::Quit {
            break;
        }
    }

    tracing::info!(
        conversations = shell.store().conversations().len(),
        "Session closed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
