//! Objects operated by the media cache.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::link::Platform;

/// Canonical identity of a video link: `<platform>:<video_id>`.
///
/// Neither platform names nor video IDs may contain `:`, so the key is injective
/// on `(platform, video_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceKey(String);

impl SourceKey {
    /// Build key from resolved link parts.
    pub fn new(platform: Platform, video_id: &str) -> Self {
        Self(format!("{}:{}", platform, video_id))
    }

    /// Wrap already formatted key, e.g. received back from a share query.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Return as string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SourceKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<SourceKey> for String {
    fn from(value: SourceKey) -> Self {
        value.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Hex-encoded SHA256 digest of raw media bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Digest the whole content.
    pub fn of(content: &[u8]) -> Self {
        Self(sha256::digest(content))
    }

    /// Wrap already computed hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Return as string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self {
        value.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Reference to media already uploaded to the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRef {
    /// Identifier used to re-send the media without uploading it again.
    pub id: String,

    /// Stable identifier of the uploaded asset. Kept for auditing only.
    pub unique_id: String,
}

/// Cached delivery of a single source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Source the media was fetched for.
    pub source_key: SourceKey,

    /// Digest of the delivered media.
    pub content_hash: ContentHash,

    /// Platform reference of the delivered media.
    pub delivery_ref: DeliveryRef,

    /// Size of the delivered media in bytes.
    pub size_bytes: i64,

    /// How many times the record was served from cache.
    pub hit_count: i64,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last cache hit or write.
    pub last_used_at: DateTime<Utc>,
}

/// Data written to the cache after a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheWrite {
    pub source_key: SourceKey,
    pub content_hash: ContentHash,
    pub delivery_ref: DeliveryRef,
    pub size_bytes: i64,
}
