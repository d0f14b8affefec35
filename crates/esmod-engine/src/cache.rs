//! In-memory artifact cache with per-key build deduplication.
//!
//! Locking discipline: reads of the build map take the shared lock, every
//! mutation takes the exclusive lock, and the build-or-reuse decision for
//! one key is serialized by a per-key async lock. A coarse cache-wide lock
//! would either serialize unrelated builds or leave the map mutation racy.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error};

use crate::compiler::{BuildOptions, Compiler, SourceId};
use crate::error::{BuildError, Result};
use crate::fs::{PathStat, SourceFs};

/// One built output.
///
/// Immutable once stored; a rebuild replaces the whole entry atomically
/// under the map's write lock.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// The source this artifact was built from.
    pub source: SourceId,
    /// Modification time of the backing file captured at build time.
    /// `None` for virtual sources, which have no backing file.
    pub modified: Option<SystemTime>,
    /// The build output.
    pub contents: Arc<[u8]>,
}

type BuildLock = Arc<tokio::sync::Mutex<()>>;

/// Maps a source to its last-built artifact with get-or-build semantics.
pub struct ArtifactCache {
    compiler: Arc<dyn Compiler>,
    fs: Arc<dyn SourceFs>,
    options: BuildOptions,
    builds: RwLock<HashMap<SourceId, Arc<Artifact>>>,
    inflight: Mutex<HashMap<SourceId, BuildLock>>,
}

impl ArtifactCache {
    /// Create an empty cache.
    ///
    /// # Arguments
    ///
    /// * `compiler` - the transform capability invoked on cache misses
    /// * `fs` - stat capability used to capture source modification times
    /// * `options` - build options applied to every compile call
    pub fn new(compiler: Arc<dyn Compiler>, fs: Arc<dyn SourceFs>, options: BuildOptions) -> Self {
        Self {
            compiler,
            fs,
            options,
            builds: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached artifact for `source`, building it on a miss.
    ///
    /// With `force` set the cached entry is ignored and rebuilt in place.
    /// Concurrent calls for the same uncached source collapse into a single
    /// compiler invocation: later callers block on the in-flight build and
    /// receive its artifact.
    ///
    /// # Errors
    ///
    /// Fails with [`BuildError::NotFound`] when the backing file is gone,
    /// [`BuildError::InvalidTarget`] for directories, [`BuildError::Failed`]
    /// when the compiler reports diagnostics (nothing is cached, so the next
    /// call retries), and [`BuildError::Internal`] when the compiler returns
    /// neither output nor diagnostics.
    pub async fn get_or_build(&self, source: &SourceId, force: bool) -> Result<Arc<Artifact>> {
        if !force {
            if let Some(hit) = self.builds.read().get(source) {
                return Ok(Arc::clone(hit));
            }
        }

        let lock = self.build_lock(source);
        let result = {
            let _flight = lock.lock().await;

            // Another caller may have finished this build while we queued.
            let requeued_hit = if force {
                None
            } else {
                self.builds.read().get(source).cloned()
            };
            match requeued_hit {
                Some(hit) => Ok(hit),
                None => self.build(source).await,
            }
        };
        self.release_build_lock(source, lock);
        result
    }

    /// The build options applied to every compile call.
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Remove the entry for `source` if present. Idempotent.
    pub fn invalidate(&self, source: &SourceId) {
        self.builds.write().remove(source);
    }

    /// The cached artifact for `source`, if any.
    pub fn get(&self, source: &SourceId) -> Option<Arc<Artifact>> {
        self.builds.read().get(source).cloned()
    }

    /// Whether `source` currently has a cached artifact.
    pub fn contains(&self, source: &SourceId) -> bool {
        self.builds.read().contains_key(source)
    }

    /// Number of cached artifacts.
    pub fn len(&self) -> usize {
        self.builds.read().len()
    }

    /// Whether the cache holds no artifacts.
    pub fn is_empty(&self) -> bool {
        self.builds.read().is_empty()
    }

    /// Snapshot of all file-backed cache keys, for the scanner's pool
    /// refill. Virtual sources are excluded: there is nothing to stat.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.builds
            .read()
            .keys()
            .filter_map(|source| match source {
                SourceId::Path(path) => Some(path.clone()),
                SourceId::Virtual(_) => None,
            })
            .collect()
    }

    async fn build(&self, source: &SourceId) -> Result<Arc<Artifact>> {
        let modified = match source {
            SourceId::Virtual(_) => None,
            SourceId::Path(path) => match self.fs.stat(path) {
                PathStat::Missing => return Err(BuildError::NotFound(path.clone())),
                PathStat::Dir => return Err(BuildError::InvalidTarget(path.clone())),
                PathStat::File { modified } => Some(modified),
            },
        };

        let started = Instant::now();
        let ret = self.compiler.compile(source, &self.options).await;

        if !ret.diagnostics.is_empty() {
            return Err(BuildError::Failed {
                diagnostics: ret.diagnostics,
            });
        }
        let Some(output) = ret.output_files.into_iter().next() else {
            error!(%source, "compiler returned neither output nor diagnostics");
            return Err(BuildError::Internal);
        };

        debug!(%source, elapsed = ?started.elapsed(), "built");

        let artifact = Arc::new(Artifact {
            source: source.clone(),
            modified,
            contents: output.contents.into(),
        });
        self.builds
            .write()
            .insert(source.clone(), Arc::clone(&artifact));
        Ok(artifact)
    }

    fn build_lock(&self, source: &SourceId) -> BuildLock {
        let mut inflight = self.inflight.lock();
        Arc::clone(inflight.entry(source.clone()).or_default())
    }

    fn release_build_lock(&self, source: &SourceId, lock: BuildLock) {
        let mut inflight = self.inflight.lock();
        // New waiters only appear under this mutex, so once our own clone is
        // gone a strong count of 1 means the map entry is the last holder.
        drop(lock);
        if inflight.get(source).is_some_and(|l| Arc::strong_count(l) == 1) {
            inflight.remove(source);
        }
    }
}
