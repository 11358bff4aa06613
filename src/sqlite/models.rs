use chrono::{DateTime, Utc};
use diesel::sqlite::Sqlite;
use diesel::{AsChangeset, Insertable, Queryable, Selectable};

use super::schema;
use crate::record::{CacheRecord, CacheWrite, ContentHash, DeliveryRef, SourceKey};

#[derive(Queryable, Selectable)]
#[diesel(table_name = schema::media_cache)]
#[diesel(check_for_backend(Sqlite))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaCache {
    pub id: i32,
    pub source_key: String,
    pub content_hash: String,
    pub delivery_ref: String,
    pub delivery_ref_unique: String,
    pub size_bytes: i64,
    pub hit_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl MediaCache {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Insertable)]
#[diesel(table_name = schema::media_cache)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMediaCache {
    pub source_key: String,
    pub content_hash: String,
    pub delivery_ref: String,
    pub delivery_ref_unique: String,
    pub size_bytes: i64,
    pub hit_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl NewMediaCache {
    /// New entry from cache write, created at `now`.
    pub fn new(write: CacheWrite, now: DateTime<Utc>) -> Self {
        Self {
            source_key: write.source_key.into(),
            content_hash: write.content_hash.into(),
            delivery_ref: write.delivery_ref.id,
            delivery_ref_unique: write.delivery_ref.unique_id,
            size_bytes: write.size_bytes,
            hit_count: 0,
            created_at: now,
            last_used_at: now,
        }
    }
}

/// Fields overwritten when an existing entry is written again.
#[derive(AsChangeset)]
#[diesel(table_name = schema::media_cache)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaCacheUpdate {
    pub content_hash: String,
    pub delivery_ref: String,
    pub delivery_ref_unique: String,
    pub size_bytes: i64,
    pub last_used_at: DateTime<Utc>,
}

impl From<NewMediaCache> for MediaCacheUpdate {
    fn from(value: NewMediaCache) -> Self {
        Self {
            content_hash: value.content_hash,
            delivery_ref: value.delivery_ref,
            delivery_ref_unique: value.delivery_ref_unique,
            size_bytes: value.size_bytes,
            last_used_at: value.last_used_at,
        }
    }
}

impl From<MediaCache> for CacheRecord {
    fn from(model: MediaCache) -> Self {
        Self {
            source_key: SourceKey::from_raw(model.source_key),
            content_hash: ContentHash::from_hex(model.content_hash),
            delivery_ref: DeliveryRef {
                id: model.delivery_ref,
                unique_id: model.delivery_ref_unique,
            },
            size_bytes: model.size_bytes,
            hit_count: model.hit_count,
            created_at: model.created_at,
            last_used_at: model.last_used_at,
        }
    }
}
