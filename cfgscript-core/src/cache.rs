//! Per-session module cache with cycle detection

use crate::{ModulePath, Result, SymbolTable};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::trace;

/// State of one module within a load session.
#[derive(Debug, Clone)]
pub enum CacheEntry<V> {
    /// Never requested in this session
    Absent,
    /// Currently being loaded; seeing this again means a cycle
    Pending,
    /// Loaded, successfully or not. Failures are never retried.
    Done(Result<Arc<SymbolTable<V>>>),
}

/// Memoization table for a single top-level load.
///
/// The cache is owned by one loader and mutated only from its call stack,
/// so it needs no locking. Concurrent loads each use their own cache.
#[derive(Debug)]
pub struct LoadCache<V> {
    entries: FxHashMap<ModulePath, CacheEntry<V>>,
}

impl<V: Clone> LoadCache<V> {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Look up the state of a module
    pub fn entry(&self, path: &ModulePath) -> CacheEntry<V> {
        match self.entries.get(path) {
            Some(entry) => entry.clone(),
            None => CacheEntry::Absent,
        }
    }

    /// Mark a module as being loaded
    pub fn begin(&mut self, path: ModulePath) {
        trace!("Loading module: {}", path);
        self.entries.insert(path, CacheEntry::Pending);
    }

    /// Record the outcome of loading a module, replacing the pending marker
    pub fn finish(&mut self, path: ModulePath, result: Result<Arc<SymbolTable<V>>>) {
        trace!("Finished module: {} (ok: {})", path, result.is_ok());
        self.entries.insert(path, CacheEntry::Done(result));
    }

    /// Number of modules requested in this session
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been requested yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Paths of every module requested in this session
    pub fn paths(&self) -> Vec<ModulePath> {
        let mut paths: Vec<_> = self.entries.keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl<V: Clone> Default for LoadCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
