//! Retrieval of media files by URL.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::{trace, warn};

use crate::errors::FetchError;

mod ytdlp;

pub use ytdlp::YtDlp;

/// Media file fetched into a private temporary directory.
///
/// The directory and everything in it is removed when this value is dropped.
#[derive(Debug)]
pub struct FetchedMedia {
    dir: TempDir,
    path: PathBuf,
}

impl FetchedMedia {
    /// Wrap file `path` located inside `dir`.
    pub fn new(dir: TempDir, path: PathBuf) -> Self {
        Self { dir, path }
    }

    /// Path to the fetched file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the fetched file.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Remove temporary directory now, logging a failure instead of returning it.
    pub fn cleanup(self) {
        let dir = self.dir.path().to_path_buf();
        trace!("removing {}", dir.display());
        if let Err(err) = self.dir.close() {
            warn!(dir = %dir.display(), error = %err, "failed to remove temporary directory");
        }
    }
}

/// Downloads media behind a link.
#[async_trait]
pub trait FetchProvider: Send + Sync {
    /// Fetch media at `url`, optionally through `proxy`.
    ///
    /// Cancelled by dropping the returned future; partially fetched data is removed.
    async fn fetch(&self, url: &str, proxy: Option<&str>) -> Result<FetchedMedia, FetchError>;
}
