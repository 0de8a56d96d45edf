//! Path-keyed storage for cached responses.
//!
//! # Responsibilities
//! - Map a request path to its [`CacheEntry`]
//! - Full replacement on write, idempotent removal
//! - Conditional removal of stale entries
//!
//! # Design Decisions
//! - No background sweeper; expiry is only checked on read
//! - Locks are held for map access only, never across I/O
//! - Unbounded: memory is bounded by traffic, not by the store
//! - Entry count is tracked on write so `len` never walks the shards

use bytes::Bytes;
use dashmap::DashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::cache::entry::CacheEntry;

/// Storage backend for cached responses.
pub trait CacheStore: Send + Sync + Debug {
    /// Entry stored under `path`, fresh or not.
    fn get(&self, path: &str) -> Option<CacheEntry>;

    /// Insert or replace the entry for `path`.
    fn put(&self, path: &str, entry: CacheEntry);

    /// Remove the entry for `path`. No-op when absent.
    fn delete(&self, path: &str);

    /// Remove the entry for `path` only if it is stale at `now`.
    ///
    /// Returns true when an entry was removed.
    fn delete_expired(&self, path: &str, now: SystemTime) -> bool {
        match self.get(path) {
            Some(entry) if !entry.is_fresh(now) => {
                self.delete(path);
                true
            }
            _ => false,
        }
    }

    /// Remove the entry for `path` only if it still holds `raw`.
    ///
    /// Returns true when an entry was removed.
    fn delete_if_unchanged(&self, path: &str, raw: &Bytes) -> bool {
        match self.get(path) {
            Some(entry) if entry.raw == *raw => {
                self.delete(path);
                true
            }
            _ => false,
        }
    }

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store backed by a sharded concurrent map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, CacheEntry>>,
    entries: Arc<AtomicUsize>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, path: &str) -> Option<CacheEntry> {
        self.inner.get(path).map(|r| r.value().clone())
    }

    fn put(&self, path: &str, entry: CacheEntry) {
        if self.inner.insert(path.to_string(), entry).is_none() {
            self.entries.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn delete(&self, path: &str) {
        if self.inner.remove(path).is_some() {
            self.entries.fetch_sub(1, Ordering::Relaxed);
        }
    }

    fn delete_expired(&self, path: &str, now: SystemTime) -> bool {
        // Checked under the shard lock so a concurrent fresh put survives
        let removed = self
            .inner
            .remove_if(path, |_, entry| !entry.is_fresh(now))
            .is_some();
        if removed {
            self.entries.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    fn delete_if_unchanged(&self, path: &str, raw: &Bytes) -> bool {
        let removed = self
            .inner
            .remove_if(path, |_, entry| entry.raw == *raw)
            .is_some();
        if removed {
            self.entries.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    fn len(&self) -> usize {
        self.entries.load(Ordering::Relaxed)
    }
}
