//! esmod CLI: on-demand build cache and dev server for ES modules.
//!
//! This crate wraps `esmod-engine` in everything a usable server needs:
//!
//! - [`cli`] - command-line definitions
//! - [`config`] - `esmod.config.json` loading with env overrides
//! - [`compiler`] - the oxc-backed [`esmod_engine::Compiler`] implementation
//! - [`server`] - the axum serving layer
//! - [`logger`] - tracing setup
//! - [`error`] - CLI-level error types

pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod logger;
pub mod server;

pub use error::{CliError, Result};
