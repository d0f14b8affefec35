//! Command-line interface definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// On-demand build cache and dev server for ES modules.
#[derive(Debug, Parser)]
#[command(name = "esmod", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Port for the HTTP server. Overrides the config file.
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve a directory in production mode: minified output, no watcher.
    Serve(ServeArgs),
    /// Serve a directory in development mode: unminified output, polling
    /// file watcher, debug logging.
    Dev(ServeArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Working directory to serve. Defaults to the current directory.
    pub dir: Option<PathBuf>,
}
