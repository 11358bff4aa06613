use tempfile::TempDir;
use vidsave::{LinkResolver, ResolvedLink, SqliteCacheStore};

pub const MIB: usize = 1024 * 1024;

/// New empty media cache in a temp directory. Removed when the directory is dropped.
#[allow(dead_code)]
pub async fn temp_store() -> (TempDir, SqliteCacheStore) {
    let tmp = tempfile::tempdir().unwrap();
    let database_url = tmp.path().join("vidsave.sqlite");
    let store = SqliteCacheStore::open(database_url.to_str().unwrap(), Some(4))
        .await
        .unwrap();
    (tmp, store)
}

/// Resolve link with default allowed hosts.
#[allow(dead_code)]
pub fn link(text: &str) -> ResolvedLink {
    LinkResolver::default().resolve(text).unwrap()
}
