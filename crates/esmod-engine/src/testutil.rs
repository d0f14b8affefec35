//! Test doubles shared by the cache and watcher unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::compiler::{BuildOptions, Compiler, CompilerReturn, SourceId};
use crate::fs::{PathStat, SourceFs};

/// In-memory filesystem: a path map plus a record of every stat issued.
pub struct FakeFs {
    entries: Mutex<HashMap<PathBuf, PathStat>>,
    statted: Mutex<HashSet<PathBuf>>,
}

impl FakeFs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            statted: Mutex::new(HashSet::new()),
        })
    }

    /// Add or replace a file whose mtime is `secs` past the epoch.
    pub fn put_file(&self, path: &Path, secs: u64) {
        let modified = UNIX_EPOCH + Duration::from_secs(secs);
        self.entries
            .lock()
            .insert(path.to_path_buf(), PathStat::File { modified });
    }

    pub fn put_dir(&self, path: &Path) {
        self.entries.lock().insert(path.to_path_buf(), PathStat::Dir);
    }

    pub fn remove(&self, path: &Path) {
        self.entries.lock().remove(path);
    }

    /// Every path statted since the last [`FakeFs::clear_statted`].
    pub fn statted(&self) -> HashSet<PathBuf> {
        self.statted.lock().clone()
    }

    pub fn clear_statted(&self) {
        self.statted.lock().clear();
    }
}

impl SourceFs for FakeFs {
    fn stat(&self, path: &Path) -> PathStat {
        self.statted.lock().insert(path.to_path_buf());
        self.entries
            .lock()
            .get(path)
            .copied()
            .unwrap_or(PathStat::Missing)
    }
}

/// Compiler double that counts invocations and can be made to fail, return
/// nothing, or block on a gate so concurrent callers overlap.
pub struct CountingCompiler {
    pub calls: AtomicUsize,
    fail: AtomicBool,
    empty: AtomicBool,
    gate: Option<Semaphore>,
}

impl CountingCompiler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            empty: AtomicBool::new(false),
            gate: None,
        })
    }

    /// A compiler whose calls block until [`CountingCompiler::open_gate`].
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            empty: AtomicBool::new(false),
            gate: Some(Semaphore::new(0)),
        })
    }

    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn return_nothing(&self, empty: bool) {
        self.empty.store(empty, Ordering::SeqCst);
    }

    pub fn open_gate(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }
}

#[async_trait]
impl Compiler for CountingCompiler {
    async fn compile(&self, source: &SourceId, _options: &BuildOptions) -> CompilerReturn {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            return CompilerReturn::failure(vec![format!("fake diagnostic for {source}")]);
        }
        if self.empty.load(Ordering::SeqCst) {
            return CompilerReturn::default();
        }
        CompilerReturn::output(format!("built:{source}").into_bytes())
    }
}
