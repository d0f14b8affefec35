//! esmod: on-demand build cache and dev server for ES modules.
//!
//! Parses the command line, loads the layered configuration, wires the
//! engine to the oxc compiler, and serves until ctrl-c.

use std::sync::Arc;

use clap::Parser;

use esmod_cli::cli::{Cli, Command};
use esmod_cli::compiler::OxcCompiler;
use esmod_cli::config::ServerConfig;
use esmod_cli::error::{CliError, Result};
use esmod_cli::server::{self, AppState};
use esmod_cli::logger;
use esmod_engine::{Mode, ModuleEngine};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("esmod: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (dev_command, dir) = match cli.command {
        Command::Dev(args) => (true, args.dir),
        Command::Serve(args) => (false, args.dir),
    };
    logger::init(&cli.log_level, dev_command);

    let root = dir.map(Ok).unwrap_or_else(std::env::current_dir)?;
    let root = std::fs::canonicalize(&root).map_err(|_| CliError::BadWorkingDir(root.clone()))?;
    if !root.is_dir() {
        return Err(CliError::BadWorkingDir(root));
    }

    let config = ServerConfig::load(&root)?;
    let mode = if dev_command || config.mode.as_deref() == Some("dev") {
        Mode::Dev
    } else {
        Mode::Production
    };
    let port = cli.port.or(config.port).unwrap_or(8080);

    tracing::info!(root = %root.display(), ?mode, "starting esmod");

    let engine = ModuleEngine::new(root, mode, Arc::new(OxcCompiler));
    let watcher = engine.start_watcher();
    let state = Arc::new(AppState::new(engine));

    let served = server::serve(state, port).await;

    if let Some(watcher) = watcher {
        watcher.shutdown().await;
    }
    served
}
