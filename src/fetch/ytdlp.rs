use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{FetchProvider, FetchedMedia};
use crate::errors::FetchError;

const TEMP_DIR_PREFIX: &str = "vidsave_";
const OUTPUT_TEMPLATE: &str = "video.%(ext)s";

/// [`FetchProvider`] running the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    temp_root: Option<PathBuf>,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl YtDlp {
    /// Use executable at `program`, resolved through `PATH` if relative.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            temp_root: None,
        }
    }

    /// Create temporary directories under `root` instead of the system default.
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    fn temp_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_DIR_PREFIX);
        match &self.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    /// Command line arguments for a single download into `dir`.
    fn args(url: &str, proxy: Option<&str>, dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--no-warnings".into(),
            "--no-playlist".into(),
            "-f".into(),
            "best".into(),
            "-o".into(),
            dir.join(OUTPUT_TEMPLATE).into_os_string(),
            "--print".into(),
            "after_move:filepath".into(),
        ];
        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            args.push("--proxy".into());
            args.push(proxy.into());
        }
        args.push(url.into());
        args
    }
}

/// First regular file in `dir`, by name.
async fn first_file(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files.into_iter().next())
}

#[async_trait]
impl FetchProvider for YtDlp {
    async fn fetch(&self, url: &str, proxy: Option<&str>) -> Result<FetchedMedia, FetchError> {
        let dir = self.temp_dir()?;
        let args = Self::args(url, proxy, dir.path());
        debug!(program = %self.program.display(), ?args, "running fetch tool");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            warn!(status = %output.status, %stderr, %stdout, url, "fetch tool failed");
            return Err(FetchError::ToolExecutionFailed {
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let printed = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(PathBuf::from);
        let path = match printed {
            Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => path,
            _ => match first_file(dir.path()).await? {
                Some(path) => {
                    debug!(path = %path.display(), "using first file in temporary directory");
                    path
                }
                None => {
                    let listing = std::fs::read_dir(dir.path())
                        .map(|entries| {
                            entries
                                .filter_map(Result::ok)
                                .map(|e| e.file_name().to_string_lossy().into_owned())
                                .collect::<Vec<_>>()
                        })
                        .unwrap_or_default();
                    warn!(dir = %dir.path().display(), ?listing, %stdout, "fetch tool produced no file");
                    return Err(FetchError::NoOutputProduced);
                }
            },
        };

        info!(url, path = %path.display(), "media fetched");
        Ok(FetchedMedia::new(dir, path))
    }
}
