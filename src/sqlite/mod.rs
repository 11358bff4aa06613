//! Media cache store backed by SQLite.
//!
//! An SQLite database build with migrations from `./migrations`.

use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use diesel::{ConnectionError, ConnectionResult, SqliteConnection};
use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::{AsyncDieselConnectionManager, ManagerConfig};
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::time::{self, Duration};
use tracing::trace;

use crate::record::{CacheRecord, CacheWrite, ContentHash, SourceKey};
use crate::store::CacheStore;

mod api;
mod models;
mod schema;

pub mod error;

#[cfg(all(test, feature = "stresstest"))]
mod stresstest;

use error::DatabaseError;

/// Inner SQLite connection type.
type Connection = SyncConnectionWrapper<SqliteConnection>;

/// SQLite pool connection manager type.
type ConnectionManager = AsyncDieselConnectionManager<Connection>;

/// Result of database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

const MIGRATIONS: EmbeddedMigrations =
    diesel_migrations::embed_migrations!("src/sqlite/migrations");

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const RETRY_TIMES: usize = 3;
const RETRY_PERIOD: Duration = Duration::from_millis(100);

/// Establish connection with SQLite database and configure it with:
///
/// - `PRAGMA journal_mode = WAL`
/// - `PRAGMA synchronous = NORMAL`
/// - `PRAGMA busy_timeout = 10_000`
///
/// We really want this to succeed, that's why we retry.
fn establish_connection(database_url: &str) -> BoxFuture<ConnectionResult<Connection>> {
    let fut = async move {
        trace!("establishing connection with {}", database_url);
        let mut connection = Connection::establish(database_url).await?;

        let query = format!(
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA busy_timeout = {};",
            BUSY_TIMEOUT.as_millis()
        );
        trace!("executing: {}", &query);

        let mut last_error = match connection.batch_execute(&query).await {
            Ok(_) => return Ok(connection),
            Err(err) => err,
        };
        for i in 0..RETRY_TIMES {
            trace!("SQLite connection configuration failed: {:?}", last_error);
            trace!("retrying, attempt #{}", i + 1);
            time::sleep(RETRY_PERIOD).await;
            match connection.batch_execute(&query).await {
                Ok(_) => return Ok(connection),
                Err(err) => last_error = err,
            }
        }
        Err(ConnectionError::CouldntSetupConfiguration(last_error))
    };
    fut.boxed()
}

/// Run pending migrations on SQLite database specified with `database_url`.
///
/// Returns the number of applied migrations.
pub async fn run_migrations(database_url: &str) -> DatabaseResult<usize> {
    let connection = establish_connection(database_url).await?;
    let mut async_wrapper: AsyncConnectionWrapper<Connection> =
        AsyncConnectionWrapper::from(connection);

    trace!("running pending migrations");
    let applied = tokio::task::spawn_blocking(move || {
        async_wrapper
            .run_pending_migrations(MIGRATIONS)
            .map(|applied| {
                applied
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .map_err(|e| DatabaseError::MigrationError(e.to_string()))
    })
    .await
    .map_err(|e| DatabaseError::MigrationError(e.to_string()))??;

    if applied.is_empty() {
        trace!("no migrations applied");
    } else {
        trace!("migrations applied:");
        for migration in &applied {
            trace!(" - {}", migration);
        }
    }
    Ok(applied.len())
}

/// Media cache store backed by SQLite.
#[derive(Clone)]
pub struct SqliteCacheStore {
    database_url: String,
    pool: Pool<Connection>,
}

impl SqliteCacheStore {
    /// Build connection pool for SQLite database with `database_url`.
    ///
    /// For each established connection following configs will be applied:
    /// - `PRAGMA journal_mode = WAL`
    /// - `PRAGMA synchronous = NORMAL`
    /// - `PRAGMA busy_timeout = 10_000`
    ///
    /// If SQLite database does not exists, it will be created.
    ///
    /// `max_size` defines the maximum size of the pool and defaults to `cpu_count * 4`.
    pub async fn connect_pool(database_url: &str, max_size: Option<usize>) -> DatabaseResult<Self> {
        let mut config = ManagerConfig::default();
        config.custom_setup = Box::new(establish_connection);
        let manager = ConnectionManager::new_with_config(database_url, config);
        let mut pool_builder = Pool::builder(manager);
        if let Some(max_size) = max_size {
            pool_builder = pool_builder.max_size(max_size);
        }
        let pool = pool_builder.build()?;
        Ok(Self {
            pool,
            database_url: database_url.to_string(),
        })
    }

    /// Run migrations, then connect.
    pub async fn open(database_url: &str, max_size: Option<usize>) -> DatabaseResult<Self> {
        run_migrations(database_url).await?;
        Self::connect_pool(database_url, max_size).await
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}

impl fmt::Debug for SqliteCacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteCacheStore")
            .field("database_url", &self.database_url)
            .finish()
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    type Error = DatabaseError;

    async fn lookup_by_key(&self, key: &SourceKey) -> DatabaseResult<Option<CacheRecord>> {
        let mut conn = self.pool.get().await?;
        let entry = api::touch_by_key(conn.as_mut(), key.as_str(), Utc::now()).await?;
        Ok(entry.map(Into::into))
    }

    async fn lookup_by_hash(&self, hash: &ContentHash) -> DatabaseResult<Option<CacheRecord>> {
        let mut conn = self.pool.get().await?;
        let entry = api::get_latest_by_hash(conn.as_mut(), hash.as_str()).await?;
        Ok(entry.map(Into::into))
    }

    async fn upsert(&self, write: CacheWrite) -> DatabaseResult<CacheRecord> {
        let mut conn = self.pool.get().await?;
        let entry = api::upsert(conn.as_mut(), models::NewMediaCache::new(write, Utc::now())).await?;
        Ok(entry.into())
    }

    async fn find(&self, key: &SourceKey) -> DatabaseResult<Option<CacheRecord>> {
        let mut conn = self.pool.get().await?;
        let entry = api::get_by_key(conn.as_mut(), key.as_str()).await?;
        Ok(entry.map(Into::into))
    }

    async fn list(&self) -> DatabaseResult<Vec<CacheRecord>> {
        let mut conn = self.pool.get().await?;
        let entries = api::get_all(conn.as_mut()).await?;
        Ok(entries.into_iter().map(Into::into).collect())
    }

    async fn remove(&self, key: &SourceKey) -> DatabaseResult<bool> {
        let mut conn = self.pool.get().await?;
        api::soft_delete(conn.as_mut(), key.as_str(), Utc::now()).await
    }
}
