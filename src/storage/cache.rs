//! Bounded file cache
//!
//! Maps file path to parsed `SourceFile`. When the entry count exceeds the
//! capacity, the oldest *inserted* entries are evicted first (FIFO by
//! insertion, reads do not refresh an entry).
//!
//! Loads of the same path are serialised by a per-path mutex so two callers
//! never parse the same file twice; loads of different paths proceed
//! concurrently.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::storage::error::StorageResult;
use crate::storage::types::{CacheStats, SourceFile};

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<PathBuf, Arc<SourceFile>>,
    /// Insertion order, oldest first
    order: VecDeque<PathBuf>,
}

/// Insertion-ordered cache of parsed files
#[derive(Debug)]
pub struct FileCache {
    capacity: usize,
    state: RwLock<CacheState>,
    /// In-flight load guards keyed by path
    loading: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: RwLock::new(CacheState::default()),
            loading: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up a cached file
    pub async fn get(&self, path: &Path) -> Option<Arc<SourceFile>> {
        let state = self.state.read().await;
        state.entries.get(path).cloned()
    }

    /// Insert a parsed file and evict until the bound holds
    ///
    /// Returns the paths that were evicted.
    pub async fn insert(&self, file: Arc<SourceFile>) -> Vec<PathBuf> {
        let mut state = self.state.write().await;
        let path = file.path.clone();

        if state.entries.insert(path.clone(), file).is_none() {
            state.order.push_back(path);
        }

        let mut evicted = Vec::new();
        while state.entries.len() > self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            evicted.push(oldest);
        }

        if !evicted.is_empty() {
            tracing::debug!("Evicted {} file(s) from cache", evicted.len());
        }
        evicted
    }

    /// Return the cached file, or run `load` once and cache its result
    ///
    /// Concurrent callers for the same path wait for the first load and
    /// then read its cached result. Failed loads are not cached.
    pub async fn get_or_load<F, Fut>(&self, path: &Path, load: F) -> StorageResult<Arc<SourceFile>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StorageResult<SourceFile>>,
    {
        if let Some(hit) = self.get(path).await {
            tracing::debug!("Cache hit for {:?}", path);
            return Ok(hit);
        }

        let guard = {
            let mut loading = self.loading.lock().await;
            Arc::clone(
                loading
                    .entry(path.to_path_buf())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _held = guard.lock().await;

        // Another caller may have finished the load while we waited
        if let Some(hit) = self.get(path).await {
            return Ok(hit);
        }

        let outcome = match load().await {
            Ok(file) => {
                let file = Arc::new(file);
                self.insert(Arc::clone(&file)).await;
                Ok(file)
            }
            Err(e) => Err(e),
        };

        self.release_guard(path, &guard).await;
        outcome
    }

    /// Drop the per-path guard once no other caller holds or waits on it
    ///
    /// Callers clone the guard under the `loading` lock, so the count seen
    /// here cannot grow while the check runs.
    async fn release_guard(&self, path: &Path, guard: &Arc<Mutex<()>>) {
        let mut loading = self.loading.lock().await;
        let idle = loading
            .get(path)
            .map(|current| Arc::ptr_eq(current, guard) && Arc::strong_count(guard) == 2)
            .unwrap_or(false);
        if idle {
            loading.remove(path);
        }
    }

    /// Drop every cached entry
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.order.clear();
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Size and member keys, oldest first
    pub async fn stats(&self, enabled: bool) -> CacheStats {
        let state = self.state.read().await;
        CacheStats {
            size: state.entries.len(),
            capacity: self.capacity,
            enabled,
            files: state.order.iter().cloned().collect(),
        }
    }
}
