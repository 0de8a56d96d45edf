//! Stored response record.

use bytes::Bytes;
use std::time::SystemTime;

/// One cached response in wire format together with its expiry.
///
/// Entries are never patched in place: a newer response for the same path
/// replaces the whole entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Encoded HTTP response, as produced by `http::codec::encode`.
    pub raw: Bytes,
    /// Absolute instant from which the entry is stale.
    pub expires_at: SystemTime,
}

impl CacheEntry {
    /// Create a new entry.
    pub fn new(raw: impl Into<Bytes>, expires_at: SystemTime) -> Self {
        Self {
            raw: raw.into(),
            expires_at,
        }
    }

    /// Check if the entry may still be served at `now`.
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }
}
