diesel::table! {
    /// Media delivered at least once, keyed by source.
    media_cache (id) {
        /// Primary key.
        id -> Integer,

        // Manually added UNIQUE to up.sql, because diesel can't do that
        /// `<platform>:<video_id>` of the delivered video.
        source_key -> VarChar,

        /// Hex SHA256 of the delivered bytes. Indexed, not unique.
        content_hash -> VarChar,

        /// Reference used to re-send the media.
        delivery_ref -> VarChar,

        /// Secondary platform identifier of the media.
        delivery_ref_unique -> VarChar,

        /// Size of the delivered media in bytes.
        size_bytes -> BigInt,

        /// Number of cache hits.
        hit_count -> BigInt,

        /// Entry creation timestamp.
        created_at -> TimestamptzSqlite,

        /// Last hit or write.
        last_used_at -> TimestamptzSqlite,

        /// Soft delete marker.
        deleted_at -> Nullable<TimestamptzSqlite>,
    }
}
