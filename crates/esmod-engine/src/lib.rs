//! esmod-engine: on-demand build cache for browser-loadable modules.
//!
//! A request for a source file triggers a just-in-time transform whose
//! result is cached in memory and re-served until invalidated. This crate
//! is the cache and invalidation engine:
//!
//! - [`cache::ArtifactCache`] - concurrency-safe artifact cache keyed by
//!   source identity, with single-flight build deduplication per key
//! - [`watcher::PollWatcher`] - amortized polling scanner that detects
//!   filesystem changes without OS notification APIs and invalidates or
//!   rebuilds the affected entry
//! - [`compiler::Compiler`] - the boundary trait for the actual
//!   source-to-output transform, which this crate treats as opaque
//!
//! The HTTP serving layer, CLI, and the real compiler live in the
//! `esmod-cli` crate; everything here is transport-agnostic.

pub mod cache;
pub mod compiler;
pub mod error;
pub mod fs;
pub mod watcher;

#[cfg(test)]
mod testutil;

pub use cache::{Artifact, ArtifactCache};
pub use compiler::{BuildOptions, Compiler, CompilerReturn, ModuleFormat, OutputFile, SourceId};
pub use error::{BuildError, Result};
pub use fs::{PathStat, SourceFs, SystemFs};
pub use watcher::{DirtyPath, PollWatcher, WatchConfig, WatcherHandle};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Serving mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Unminified output; the polling watcher runs.
    Dev,
    /// Minified output; no watcher, sources are assumed immutable.
    Production,
}

impl Mode {
    pub fn is_dev(self) -> bool {
        matches!(self, Mode::Dev)
    }
}

/// The engine: one explicitly owned cache plus its watcher configuration.
///
/// Constructed per process and handed to both the serving layer and the
/// watcher; there is no global state, so tests instantiate as many
/// independent engines as they need.
pub struct ModuleEngine {
    cache: Arc<ArtifactCache>,
    fs: Arc<dyn SourceFs>,
    mode: Mode,
    root: PathBuf,
    watch: WatchConfig,
}

impl ModuleEngine {
    /// Build an engine over the real filesystem.
    ///
    /// # Arguments
    ///
    /// * `root` - working-directory root the server resolves paths under
    /// * `mode` - dev or production; drives minification and watching
    /// * `compiler` - the transform invoked on cache misses
    pub fn new(root: PathBuf, mode: Mode, compiler: Arc<dyn Compiler>) -> Self {
        Self::with_fs(root, mode, compiler, Arc::new(SystemFs))
    }

    /// Build an engine with an injected stat capability (tests).
    pub fn with_fs(
        root: PathBuf,
        mode: Mode,
        compiler: Arc<dyn Compiler>,
        fs: Arc<dyn SourceFs>,
    ) -> Self {
        let options = BuildOptions {
            minify: !mode.is_dev(),
            ..BuildOptions::default()
        };
        let cache = Arc::new(ArtifactCache::new(compiler, Arc::clone(&fs), options));
        Self {
            cache,
            fs,
            mode,
            root,
            watch: WatchConfig::default(),
        }
    }

    /// Override the watcher tuning knobs.
    pub fn with_watch_config(mut self, watch: WatchConfig) -> Self {
        self.watch = watch;
        self
    }

    pub fn cache(&self) -> Arc<ArtifactCache> {
        Arc::clone(&self.cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Start the polling watcher.
    ///
    /// Returns `None` in production mode: polling for edits only makes
    /// sense in an iterative development workflow.
    pub fn start_watcher(&self) -> Option<WatcherHandle> {
        self.mode.is_dev().then(|| {
            PollWatcher::new(self.cache(), Arc::clone(&self.fs), self.watch.clone()).spawn()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::CountingCompiler;

    #[test]
    fn test_mode_drives_minification() {
        let dev = ModuleEngine::new(PathBuf::from("/srv"), Mode::Dev, CountingCompiler::new());
        assert!(!dev.cache.options().minify);

        let prod = ModuleEngine::new(
            PathBuf::from("/srv"),
            Mode::Production,
            CountingCompiler::new(),
        );
        assert!(prod.cache.options().minify);
    }

    #[tokio::test]
    async fn test_production_mode_has_no_watcher() {
        let engine = ModuleEngine::new(
            PathBuf::from("/srv"),
            Mode::Production,
            CountingCompiler::new(),
        );
        assert!(engine.start_watcher().is_none());
    }
}
