//! Session-wide memoization of expensive pairwise computations.
//!
//! Entries depend on the current match state through potential equality, so
//! the whole cache is dropped on every match or unmatch. Ranking workers share
//! it through `&Cache`; the maps sit behind `RwLock`s and the counters are atomics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::model::MethodId;

/// Instruction alignment from method A's instructions to method B's.
pub type InsnMap = Arc<Vec<Option<usize>>>;

#[derive(Debug, Default)]
pub struct Cache {
    insn_maps: RwLock<HashMap<(MethodId, MethodId), InsnMap>>,
    code_scores: RwLock<HashMap<(MethodId, MethodId), f64>>,
    hits: AtomicU64,
    misses: AtomicU64,
    clears: AtomicU64,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insn_map(&self, key: (MethodId, MethodId), compute: impl FnOnce() -> Vec<Option<usize>>) -> InsnMap {
        if let Some(hit) = read(&self.insn_maps).get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(hit);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = Arc::new(compute());
        write(&self.insn_maps).insert(key, Arc::clone(&value));
        value
    }

    pub fn code_score(&self, key: (MethodId, MethodId), compute: impl FnOnce() -> f64) -> f64 {
        if let Some(hit) = read(&self.code_scores).get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return *hit;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute();
        write(&self.code_scores).insert(key, value);
        value
    }

    pub fn clear(&self) {
        write(&self.insn_maps).clear();
        write(&self.code_scores).clear();
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of times the cache has been cleared since the session started.
    pub fn clear_count(&self) -> u64 {
        self.clears.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            insn_maps: read(&self.insn_maps).len() as u64,
            code_scores: read(&self.code_scores).len() as u64,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            clears: self.clear_count(),
        }
    }
}

// a poisoned lock only means a ranking unit panicked; the batch is aborted anyway
fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub insn_maps: u64,
    pub code_scores: u64,
    pub hits: u64,
    pub misses: u64,
    pub clears: u64,
}
