//! Amortized polling watcher.
//!
//! Detects that a cached artifact's backing file changed or disappeared
//! without OS-level notification APIs, by statting a rotating subset of the
//! watched paths every interval. Worst-case detection latency is bounded by
//! `interval * max_cycles_per_sweep`; per-cycle syscall cost is bounded
//! regardless of how many files are cached.
//!
//! Each cycle re-stats the small *recent set* first (paths that changed
//! lately, e.g. a file under active editing), then one cycle's worth of the
//! shuffled *scan pool*. The first dirty path found is reported and the
//! rest of the batch is skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::ArtifactCache;
use crate::compiler::SourceId;
use crate::fs::{PathStat, SourceFs};

/// Tuning knobs for the scanner.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Sleep between scan cycles.
    pub interval: Duration,
    /// Capacity of the recent set.
    pub max_recent_items: usize,
    /// Floor on pool paths statted per cycle, so tiny caches are swept in
    /// a single cycle.
    pub min_items_per_cycle: usize,
    /// Bound on cycles per sweep; caps worst-case detection latency at
    /// `interval * max_cycles_per_sweep`.
    pub max_cycles_per_sweep: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(50),
            max_recent_items: 16,
            min_items_per_cycle: 64,
            max_cycles_per_sweep: 20,
        }
    }
}

/// A change report. `modified` is `None` when the path no longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyPath {
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
}

/// The dirty-path scanner and invalidation loop.
///
/// All scan state (recent set, pool, per-cycle quota) is private to the
/// watcher's single task; the only shared structure it touches is the
/// artifact cache, through its locked operations.
pub struct PollWatcher {
    cache: Arc<ArtifactCache>,
    fs: Arc<dyn SourceFs>,
    config: WatchConfig,
    recent: Vec<PathBuf>,
    to_scan: Vec<PathBuf>,
    items_per_cycle: usize,
    rng: StdRng,
}

impl PollWatcher {
    /// Create a watcher over `cache`.
    pub fn new(cache: Arc<ArtifactCache>, fs: Arc<dyn SourceFs>, config: WatchConfig) -> Self {
        Self::with_seed(cache, fs, config, rand::random())
    }

    /// Create a watcher with a fixed shuffle seed. The generator lives for
    /// the watcher's lifetime; pools are not re-seeded per refill.
    pub fn with_seed(
        cache: Arc<ArtifactCache>,
        fs: Arc<dyn SourceFs>,
        config: WatchConfig,
        seed: u64,
    ) -> Self {
        Self {
            cache,
            fs,
            config,
            recent: Vec::new(),
            to_scan: Vec::new(),
            items_per_cycle: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Spawn the scan/invalidate loop on the current runtime.
    pub fn spawn(mut self) -> WatcherHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let interval = self.config.interval;
        let task = tokio::spawn(async move {
            debug!("watching files for changes");
            while !flag.load(Ordering::Relaxed) {
                tokio::time::sleep(interval).await;
                if let Some(dirty) = self.try_find_dirty() {
                    self.consume(dirty).await;
                }
            }
        });
        WatcherHandle { stop, task }
    }

    /// Run one scan cycle, returning the first dirty path found.
    fn try_find_dirty(&mut self) -> Option<DirtyPath> {
        // Out of pool: start a new sweep over everything currently cached.
        if self.to_scan.is_empty() {
            self.refill_pool();
        }

        // The recent set is checked in full every cycle; a path that just
        // changed is the likeliest to change again.
        let mut hit = None;
        for (i, path) in self.recent.iter().enumerate() {
            if let Some(dirty) = self.check_dirty(path) {
                hit = Some((i, dirty));
                break;
            }
        }
        if let Some((i, dirty)) = hit {
            let path = self.recent.remove(i);
            self.recent.push(path);
            return Some(dirty);
        }

        // One cycle's worth of the pool, popped off the tail. On a hit the
        // rest of the batch is dropped; it gets revisited next sweep.
        let take = self.items_per_cycle.min(self.to_scan.len());
        let batch = self.to_scan.split_off(self.to_scan.len() - take);
        for path in batch {
            if let Some(dirty) = self.check_dirty(&path) {
                self.remember_recent(path);
                return Some(dirty);
            }
        }

        None
    }

    /// Consume one report: removals invalidate, changes rebuild eagerly.
    /// A failing rebuild downgrades to invalidation so the next request
    /// retries; the loop itself never dies.
    async fn consume(&mut self, dirty: DirtyPath) {
        let source = SourceId::Path(dirty.path.clone());
        match dirty.modified {
            None => {
                debug!(path = %dirty.path.display(), "watched file removed, invalidating");
                self.cache.invalidate(&source);
            }
            Some(_) => {
                debug!(path = %dirty.path.display(), "watched file changed, rebuilding");
                if let Err(err) = self.cache.get_or_build(&source, true).await {
                    warn!(path = %dirty.path.display(), %err, "rebuild failed, entry invalidated");
                    self.cache.invalidate(&source);
                }
            }
        }
        self.prune_recent();
    }

    fn refill_pool(&mut self) {
        let mut pool = self.cache.watched_paths();
        // Uniform shuffle so no path systematically waits a full sweep.
        pool.shuffle(&mut self.rng);
        self.items_per_cycle = pool
            .len()
            .div_ceil(self.config.max_cycles_per_sweep.max(1))
            .max(self.config.min_items_per_cycle);
        self.to_scan = pool;
    }

    /// Is `path`'s cached artifact stale against the filesystem?
    fn check_dirty(&self, path: &Path) -> Option<DirtyPath> {
        let artifact = self.cache.get(&SourceId::Path(path.to_path_buf()))?;
        match self.fs.stat(path) {
            // A file that turned into a directory is as gone as a deleted
            // one; rebuilding it could never succeed.
            PathStat::Missing | PathStat::Dir => Some(DirtyPath {
                path: path.to_path_buf(),
                modified: None,
            }),
            PathStat::File { modified } => {
                if artifact.modified == Some(modified) {
                    None
                } else {
                    Some(DirtyPath {
                        path: path.to_path_buf(),
                        modified: Some(modified),
                    })
                }
            }
        }
    }

    fn remember_recent(&mut self, path: PathBuf) {
        self.recent.push(path);
        if self.recent.len() > self.config.max_recent_items {
            self.recent.remove(0);
        }
    }

    /// Drop recent-set entries whose cache keys are gone, so the scanner
    /// never reports a path the cache has already forgotten.
    fn prune_recent(&mut self) {
        let cache = &self.cache;
        self.recent
            .retain(|path| cache.contains(&SourceId::Path(path.clone())));
    }
}

/// Handle to a running watcher task.
pub struct WatcherHandle {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Signal the watcher to stop. Observed at the top of the next cycle,
    /// so shutdown latency is at most one interval; in-flight stats are
    /// never interrupted.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Stop and wait for the task to finish.
    pub async fn shutdown(self) {
        self.stop();
        let _ = self.task.await;
    }
}
