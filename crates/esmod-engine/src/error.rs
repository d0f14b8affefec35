//! Build error taxonomy.
//!
//! Every build-time failure propagates synchronously to the caller of
//! [`crate::cache::ArtifactCache::get_or_build`] as one of these variants,
//! so the serving layer can map it to a transport status code.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while building an artifact.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The backing file does not exist at build time.
    #[error("source not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The path resolves to a directory, which can never be built.
    #[error("cannot build a directory: {}", .0.display())]
    InvalidTarget(PathBuf),

    /// The compiler reported one or more diagnostics.
    ///
    /// Failed builds are never cached, so the identical request after a fix
    /// succeeds without manual cache busting.
    #[error("build failed:\n{}", .diagnostics.join("\n"))]
    Failed {
        /// All diagnostic messages the compiler reported.
        diagnostics: Vec<String>,
    },

    /// The compiler produced neither output nor diagnostics.
    ///
    /// An inconsistency at the compiler boundary, treated as a bug signal.
    #[error("compiler returned neither output nor diagnostics")]
    Internal,
}

/// Result type alias using [`BuildError`] as the default error type.
pub type Result<T, E = BuildError> = std::result::Result<T, E>;
