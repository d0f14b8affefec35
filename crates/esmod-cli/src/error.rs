//! CLI-level errors.
//!
//! Build-time errors stay inside the serving layer (they become HTTP
//! responses); this type covers startup and process-level failures.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort the esmod process.
#[derive(Debug, Error)]
pub enum CliError {
    /// The working directory argument does not name a directory.
    #[error("no such working directory: {}", .0.display())]
    BadWorkingDir(PathBuf),

    /// `esmod.config.json` exists but cannot be parsed.
    #[error("invalid config file: {0}\n\nHint: check esmod.config.json syntax and field types")]
    Config(String),

    /// The HTTP server failed to bind or serve.
    #[error("server error: {0}")]
    Server(String),

    /// I/O errors from file system operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using [`CliError`] as the default error type.
pub type Result<T, E = CliError> = std::result::Result<T, E>;
