//! Durable media cache interface.

use async_trait::async_trait;

use crate::record::{CacheRecord, CacheWrite, ContentHash, SourceKey};

/// Persistent mapping from a [`SourceKey`] to already delivered media.
///
/// Lookups that find nothing return `Ok(None)`. Errors only signal that the store itself is
/// unavailable.
#[async_trait]
pub trait CacheStore: Clone + Send + Sync {
    /// Error type of the store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Get live record by key, counting a cache hit.
    ///
    /// On success `hit_count` is incremented and `last_used_at` set to now. Returned record
    /// reflects the increment.
    async fn lookup_by_key(&self, key: &SourceKey) -> Result<Option<CacheRecord>, Self::Error>;

    /// Get live record by content hash without touching counters.
    ///
    /// If several records share the hash, the most recently used one is returned.
    async fn lookup_by_hash(&self, hash: &ContentHash) -> Result<Option<CacheRecord>, Self::Error>;

    /// Insert new record or update an existing one with the same key.
    ///
    /// Updates keep `created_at` and `hit_count` of a live record.
    async fn upsert(&self, write: CacheWrite) -> Result<CacheRecord, Self::Error>;

    /// Get live record by key without touching counters.
    async fn find(&self, key: &SourceKey) -> Result<Option<CacheRecord>, Self::Error>;

    /// All live records, most recently used first.
    async fn list(&self) -> Result<Vec<CacheRecord>, Self::Error>;

    /// Soft-delete record. Returns `false` if there was no live record with this key.
    async fn remove(&self, key: &SourceKey) -> Result<bool, Self::Error>;
}
