//! Stress-testing SQLite media cache store.
//!
//! This test is pretty heavy, so it is hidden behind `stresstest` feature.
//! It is not going to be run by default.

use super::error::DatabaseError;
use super::SqliteCacheStore;
use crate::record::{CacheWrite, ContentHash, DeliveryRef, SourceKey};
use crate::store::CacheStore;
use tracing_test::traced_test;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[traced_test]
async fn test_cache_store_stress_testing() {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tokio::task::JoinSet;

    // This test will run a bunch of random operations
    // on the store from multiple workers at the same time.
    // The goal is to make sure we will get no unexpected errors.

    // num of workers
    const N: usize = 24;

    // num of operations to perform
    const COUNT: usize = 2000;

    // small key space, so workers collide on the same rows
    const KEYS: u32 = 50;

    // testing on new empty database
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("vidsave.sqlite");
    let store = SqliteCacheStore::open(db_path.to_str().unwrap(), Some(N))
        .await
        .expect("open store");

    let unknown_errors = Arc::new(AtomicU64::new(0));

    let mut tasks = JoinSet::new();
    for _ in 0..N {
        tasks.spawn(inner(store.clone(), unknown_errors.clone()));
    }

    // spam random store operations
    async fn inner(store: SqliteCacheStore, unknown_errors: Arc<AtomicU64>) {
        use rand::Rng;

        // Operation codes:
        // 1 - upsert
        // 2 - lookup_by_key
        // 3 - lookup_by_hash
        // 4 - find
        // 5 - list
        // 6 - remove

        for _ in 0..COUNT {
            let (action, key, content) = {
                let mut rng = rand::rng();
                let action = rng.random_range(1..7);
                let id = rng.random_range(0..KEYS);
                let content = rng.random_range(0..KEYS / 5);
                (action, SourceKey::from_raw(format!("tiktok:{}", id)), content)
            };
            let hash = ContentHash::of(format!("content {}", content).as_bytes());

            let result = match action {
                1 => store
                    .upsert(CacheWrite {
                        source_key: key.clone(),
                        content_hash: hash,
                        delivery_ref: DeliveryRef {
                            id: format!("ref-{}", key),
                            unique_id: format!("uniq-{}", key),
                        },
                        size_bytes: 1024,
                    })
                    .await
                    .map(|record| assert_eq!(record.source_key, key)),
                2 => store.lookup_by_key(&key).await.map(|_| ()),
                3 => store.lookup_by_hash(&hash).await.map(|_| ()),
                4 => store.find(&key).await.map(|_| ()),
                5 => store.list().await.map(|records| {
                    assert!(records.len() <= KEYS as usize);
                }),
                6 => store.remove(&key).await.map(|_| ()),
                _ => unreachable!(),
            };

            match result {
                Ok(()) => {}
                // this includes "database is locked" error
                Err(DatabaseError::DieselError(diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::Unknown,
                    _,
                ))) => {
                    unknown_errors.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => panic!("{:?}", err),
            }
        }
    }

    tasks.join_all().await;

    let total_errors = unknown_errors.load(Ordering::Relaxed);
    const THRESHOLD: u64 = N as u64 * COUNT as u64 / 1000; // 0.1% of all operations are allowed to fail
    if total_errors > THRESHOLD {
        panic!("total_errors = {}", total_errors);
    }

    // every key maps to at most one record
    let records = store.list().await.unwrap();
    let mut keys: Vec<_> = records.iter().map(|r| r.source_key.clone()).collect();
    keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    keys.dedup();
    assert_eq!(keys.len(), records.len());
}
