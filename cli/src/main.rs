//! `intentcad` — a terminal front end for the conversational CAD engine.
//!
//! Runs a single session for the life of the process. Plain lines are
//! submitted as conversational turns; lines starting with `:` invoke the
//! non-conversational edit entrypoints (`:params`, `:checkpoint`, ...)
//! directly against the engine, bypassing the planner entirely.

mod repl;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use intentcad_core::{ConfigLoader, Engine};

/// The intentcad command-line client.
#[derive(Debug, Parser)]
#[command(name = "intentcad", version, about)]
struct Cli {
    /// Path to a config.toml; falls back to ~/.intentcad/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start an interactive chat session (default if no subcommand given).
    Repl,
    /// Submit a single utterance and print the result, then exit.
    Turn {
        /// The utterance to submit.
        utterance: Vec<String>,
    },
    /// Validate a script and/or parameter map without starting a chat.
    Validate {
        /// Script text to validate.
        #[arg(long)]
        script: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = cli.config {
        loader = loader.with_config_path(path);
    }
    let config = loader.load()?;
    let engine = Engine::new(config)?;

    match cli.command.unwrap_or(Command::Repl) {
        Command::Repl => repl::run(&engine).await,
        Command::Turn { utterance } => {
            let session_id = engine.start_session();
            let outcome = engine
                .submit_turn(&session_id, &utterance.join(" "), None, None)
                .await?;
            println!("{}", outcome.response_text);
            if let Some(exec) = outcome.execution {
                println!("status: {:?}", exec.status);
            }
            Ok(())
        }
        Command::Validate { script } => {
            let session_id = engine.start_session();
            let report = engine
                .validate_edit(&session_id, script.as_deref(), &Default::default())
                .await?;
            println!("valid: {}", report.is_valid);
            for error in &report.errors {
                println!("  error: {error}");
            }
            for warning in &report.warnings {
                println!("  warning: {warning}");
            }
            Ok(())
        }
    }
}
