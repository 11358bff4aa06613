//! Convenient API to interact with media cache database.
//!
//! Basically just fancy wrappers around transactions on [`Connection`].

use chrono::{DateTime, Utc};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::trace;

use super::models::{MediaCache, MediaCacheUpdate, NewMediaCache};
use super::schema::media_cache::dsl::{self, media_cache};
use super::{Connection, DatabaseResult};

/// Insert new entry to database.
pub async fn insert(
    connection: &mut Connection,
    new_entry: NewMediaCache,
) -> DatabaseResult<MediaCache> {
    connection
        .immediate_transaction(|conn| {
            async {
                trace!("INSERT {:?}", new_entry);
                let inserted = diesel::insert_into(media_cache)
                    .values(&new_entry)
                    .get_result::<MediaCache>(conn)
                    .await?;
                Ok(inserted)
            }
            .scope_boxed()
        })
        .await
}

/// Get live entry by source key.
pub async fn get_by_key(
    connection: &mut Connection,
    key: &str,
) -> DatabaseResult<Option<MediaCache>> {
    connection
        .transaction(|conn| {
            async {
                trace!("SELECT * WHERE source_key={} AND deleted_at IS NULL", key);
                media_cache
                    .filter(dsl::source_key.eq(key))
                    .filter(dsl::deleted_at.is_null())
                    .select(MediaCache::as_select())
                    .first(conn)
                    .await
                    .optional()
            }
            .scope_boxed()
        })
        .await
        .map_err(Into::into)
}

/// Count a hit of live entry with `key`. Returns updated entry.
pub async fn touch_by_key(
    connection: &mut Connection,
    key: &str,
    now: DateTime<Utc>,
) -> DatabaseResult<Option<MediaCache>> {
    connection
        .immediate_transaction(|conn| {
            async {
                trace!(
                    "UPDATE SET hit_count=hit_count+1, last_used_at={} WHERE source_key={} AND deleted_at IS NULL",
                    now,
                    key
                );
                diesel::update(
                    media_cache
                        .filter(dsl::source_key.eq(key))
                        .filter(dsl::deleted_at.is_null()),
                )
                .set((
                    dsl::hit_count.eq(dsl::hit_count + 1_i64),
                    dsl::last_used_at.eq(now),
                ))
                .get_result::<MediaCache>(conn)
                .await
                .optional()
            }
            .scope_boxed()
        })
        .await
        .map_err(Into::into)
}

/// Get most recently used live entry with given content hash.
pub async fn get_latest_by_hash(
    connection: &mut Connection,
    hash: &str,
) -> DatabaseResult<Option<MediaCache>> {
    connection
        .transaction(|conn| {
            async {
                trace!(
                    "SELECT * WHERE content_hash={} AND deleted_at IS NULL ORDER BY last_used_at DESC",
                    hash
                );
                media_cache
                    .filter(dsl::content_hash.eq(hash))
                    .filter(dsl::deleted_at.is_null())
                    .order((dsl::last_used_at.desc(), dsl::id.desc()))
                    .select(MediaCache::as_select())
                    .first(conn)
                    .await
                    .optional()
            }
            .scope_boxed()
        })
        .await
        .map_err(Into::into)
}

/// Get all live entries, most recently used first.
pub async fn get_all(connection: &mut Connection) -> DatabaseResult<Vec<MediaCache>> {
    connection
        .transaction(|conn| {
            async {
                trace!("SELECT * WHERE deleted_at IS NULL ORDER BY last_used_at DESC");
                media_cache
                    .filter(dsl::deleted_at.is_null())
                    .order((dsl::last_used_at.desc(), dsl::id.desc()))
                    .select(MediaCache::as_select())
                    .get_results(conn)
                    .await
            }
            .scope_boxed()
        })
        .await
        .map_err(Into::into)
}

/// Write entry by its source key.
///
/// - absent key: inserted;
/// - live entry: mutable fields overwritten, `created_at` and `hit_count` kept;
/// - soft-deleted entry: revived as a brand new one.
pub async fn upsert(
    connection: &mut Connection,
    new_entry: NewMediaCache,
) -> DatabaseResult<MediaCache> {
    connection
        .immediate_transaction(|conn| {
            async {
                trace!("SELECT * WHERE source_key={}", new_entry.source_key);
                let existing = media_cache
                    .filter(dsl::source_key.eq(&new_entry.source_key))
                    .select(MediaCache::as_select())
                    .first(conn)
                    .await
                    .optional()?;

                match existing {
                    None => {
                        trace!("INSERT {:?}", new_entry);
                        diesel::insert_into(media_cache)
                            .values(&new_entry)
                            .get_result::<MediaCache>(conn)
                            .await
                    }
                    Some(entry) if entry.is_deleted() => {
                        trace!("UPDATE {:?} SET deleted_at=NULL WHERE id={}", new_entry, entry.id);
                        diesel::update(media_cache.find(entry.id))
                            .set((
                                dsl::content_hash.eq(&new_entry.content_hash),
                                dsl::delivery_ref.eq(&new_entry.delivery_ref),
                                dsl::delivery_ref_unique.eq(&new_entry.delivery_ref_unique),
                                dsl::size_bytes.eq(new_entry.size_bytes),
                                dsl::hit_count.eq(new_entry.hit_count),
                                dsl::created_at.eq(new_entry.created_at),
                                dsl::last_used_at.eq(new_entry.last_used_at),
                                dsl::deleted_at.eq(None::<DateTime<Utc>>),
                            ))
                            .get_result::<MediaCache>(conn)
                            .await
                    }
                    Some(entry) => {
                        let changes = MediaCacheUpdate::from(new_entry.clone());
                        trace!("UPDATE {:?} WHERE id={}", changes, entry.id);
                        diesel::update(media_cache.find(entry.id))
                            .set(&changes)
                            .get_result::<MediaCache>(conn)
                            .await
                    }
                }
            }
            .scope_boxed()
        })
        .await
        .map_err(Into::into)
}

/// Mark live entry with `key` as deleted. Returns `false` if there was none.
pub async fn soft_delete(
    connection: &mut Connection,
    key: &str,
    now: DateTime<Utc>,
) -> DatabaseResult<bool> {
    connection
        .immediate_transaction(|conn| {
            async {
                trace!("UPDATE SET deleted_at={} WHERE source_key={}", now, key);
                let affected = diesel::update(
                    media_cache
                        .filter(dsl::source_key.eq(key))
                        .filter(dsl::deleted_at.is_null()),
                )
                .set(dsl::deleted_at.eq(Some(now)))
                .execute(conn)
                .await?;
                Ok(affected > 0)
            }
            .scope_boxed()
        })
        .await
}
