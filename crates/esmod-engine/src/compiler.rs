//! The compiler boundary.
//!
//! The engine treats the source-to-output transform as an opaque, possibly
//! slow capability: given a source identity and build options it produces
//! output files or diagnostics. The cache never inspects the output; it
//! only stores it.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Identity of a buildable source, used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceId {
    /// A module backed by a file on disk.
    Path(PathBuf),
    /// A synthetic module with no backing file, e.g. an embedded builtin.
    ///
    /// Virtual sources carry no modification time and are excluded from
    /// change scanning.
    Virtual(String),
}

impl SourceId {
    /// True for sources with no filesystem backing.
    pub fn is_virtual(&self) -> bool {
        matches!(self, SourceId::Virtual(_))
    }

    /// The backing file path, if there is one.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            SourceId::Path(path) => Some(path),
            SourceId::Virtual(_) => None,
        }
    }
}

impl From<PathBuf> for SourceId {
    fn from(path: PathBuf) -> Self {
        SourceId::Path(path)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Path(path) => write!(f, "{}", path.display()),
            SourceId::Virtual(name) => write!(f, "builtin:{name}"),
        }
    }
}

/// Output module format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleFormat {
    /// ECMAScript modules, the only format browsers load natively.
    #[default]
    Esm,
}

/// Options handed to the compiler for every build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Strip whitespace and mangle identifiers in the output.
    pub minify: bool,
    /// Output module format.
    pub format: ModuleFormat,
    /// Leave import specifiers unresolved so every import stays an
    /// independently servable path instead of being inlined. This is what
    /// makes the cache per-module rather than per-bundle.
    pub externalize_imports: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            minify: false,
            format: ModuleFormat::Esm,
            externalize_imports: true,
        }
    }
}

/// One file produced by a compile call.
#[derive(Debug, Clone)]
pub struct OutputFile {
    /// The generated bytes.
    pub contents: Vec<u8>,
}

/// Everything a compile call reports back.
///
/// Mirrors the shape of a bundler build result: any diagnostics mean the
/// build failed, and no diagnostics with no output files is an
/// inconsistency the cache surfaces as [`crate::error::BuildError::Internal`].
#[derive(Debug, Clone, Default)]
pub struct CompilerReturn {
    /// Generated outputs; the cache stores the first.
    pub output_files: Vec<OutputFile>,
    /// Error messages; non-empty means the build failed.
    pub diagnostics: Vec<String>,
}

impl CompilerReturn {
    /// A successful result with a single output file.
    pub fn output(contents: Vec<u8>) -> Self {
        Self {
            output_files: vec![OutputFile { contents }],
            diagnostics: Vec::new(),
        }
    }

    /// A failed result carrying the compiler's diagnostics.
    pub fn failure(diagnostics: Vec<String>) -> Self {
        Self {
            output_files: Vec::new(),
            diagnostics,
        }
    }
}

/// The consumed transform capability.
///
/// Implementations may be slow; the cache guarantees at most one in-flight
/// call per source at a time.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Transform one source into servable output.
    async fn compile(&self, source: &SourceId, options: &BuildOptions) -> CompilerReturn;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_virtual() {
        let source = SourceId::Virtual("css.ts".to_string());
        assert!(source.is_virtual());
        assert!(source.as_path().is_none());
        assert_eq!(source.to_string(), "builtin:css.ts");
    }

    #[test]
    fn test_source_id_path() {
        let source = SourceId::Path(PathBuf::from("/srv/app.ts"));
        assert!(!source.is_virtual());
        assert_eq!(source.as_path(), Some(Path::new("/srv/app.ts")));
    }

    #[test]
    fn test_compiler_return_constructors() {
        let ok = CompilerReturn::output(b"export {}".to_vec());
        assert_eq!(ok.output_files.len(), 1);
        assert!(ok.diagnostics.is_empty());

        let bad = CompilerReturn::failure(vec!["syntax error".to_string()]);
        assert!(bad.output_files.is_empty());
        assert_eq!(bad.diagnostics.len(), 1);
    }
}
