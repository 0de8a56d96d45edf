//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! lookup(path)
//!     → store.rs (entry by path)
//!     → clock.rs (now)
//!     → fresh: Hit(entry)
//!     → stale: conditional delete, Miss
//!
//! insert(path, raw, deadline)
//!     → policy.rs decided the deadline from `Expires`
//!     → store.rs (full replacement)
//! ```
//!
//! # Design Decisions
//! - Keyed by URL path only; method and query string share one slot
//! - Store and clock are injected so expiry can be tested deterministically

pub mod clock;
pub mod entry;
pub mod policy;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use policy::Expiry;
pub use store::{CacheStore, MemoryStore};

use bytes::Bytes;
use std::sync::Arc;
use std::time::SystemTime;

use crate::observability::metrics;

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// A fresh entry exists for the path.
    Hit(CacheEntry),
    /// Nothing servable. A stale entry, if any, has been removed.
    Miss,
}

/// Expiry-aware front of a [`CacheStore`].
#[derive(Debug, Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    /// Create a cache over the given store and time source.
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// In-memory store driven by the system clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    /// Look up the entry for `path`, evicting it if it has gone stale.
    pub fn lookup(&self, path: &str) -> Lookup {
        let Some(entry) = self.store.get(path) else {
            return Lookup::Miss;
        };

        let now = self.clock.now();
        if entry.is_fresh(now) {
            return Lookup::Hit(entry);
        }

        if self.store.delete_expired(path, now) {
            tracing::debug!(path = %path, "Evicted stale cache entry");
            metrics::record_cache_size(self.store.len());
        }
        Lookup::Miss
    }

    /// Store an encoded response for `path` until `expires_at`.
    pub fn insert(&self, path: &str, raw: Bytes, expires_at: SystemTime) {
        self.store.put(path, CacheEntry::new(raw, expires_at));
        metrics::record_cache_size(self.store.len());
    }

    /// Drop whatever is stored for `path`.
    pub fn invalidate(&self, path: &str) {
        self.store.delete(path);
        metrics::record_cache_size(self.store.len());
    }

    /// Drop the entry for `path` if it still holds `raw`.
    ///
    /// A newer entry written by another request in the meantime is kept.
    pub fn discard(&self, path: &str, raw: &Bytes) -> bool {
        let removed = self.store.delete_if_unchanged(path, raw);
        if removed {
            metrics::record_cache_size(self.store.len());
        }
        removed
    }

    /// Current time according to the cache's clock.
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::in_memory()
    }
}
