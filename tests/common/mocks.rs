use std::collections::{HashMap, VecDeque};
use std::io::{Error as IoError, ErrorKind};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use vidsave::delivery::{ChatId, DeliverySink};
use vidsave::errors::{FetchError, SendError};
use vidsave::{CacheRecord, CacheStore, ContentHash, DeliveryRef, FetchProvider, FetchedMedia};
use vidsave::record::{CacheWrite, SourceKey};

/// What the fake fetcher does when called.
#[derive(Clone, Copy, Debug)]
enum FetchBehaviour {
    Succeed,
    Fail,
    Panic,
}

/// Fetch provider writing fixed content into a fresh temp directory.
///
/// Temp directories are created under [`FakeFetcher::root`], so tests can check nothing is
/// left behind.
#[allow(dead_code)]
pub struct FakeFetcher {
    content: Vec<u8>,
    behaviour: FetchBehaviour,
    delay: Option<Duration>,
    root: TempDir,
    calls: AtomicUsize,
    urls: Mutex<Vec<(String, Option<String>)>>,
}

#[allow(dead_code)]
impl FakeFetcher {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            behaviour: FetchBehaviour::Succeed,
            delay: None,
            root: tempfile::tempdir().unwrap(),
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// File of `size` zero bytes.
    pub fn with_size(size: usize) -> Self {
        Self::new(vec![0u8; size])
    }

    pub fn failing() -> Self {
        Self {
            behaviour: FetchBehaviour::Fail,
            ..Self::new(Vec::new())
        }
    }

    pub fn panicking() -> Self {
        Self {
            behaviour: FetchBehaviour::Panic,
            ..Self::new(Vec::new())
        }
    }

    /// Sleep for `delay` after the temp directory is created.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<(String, Option<String>)> {
        self.urls.lock().unwrap().clone()
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Number of temp directories still existing.
    pub fn leftover_dirs(&self) -> usize {
        std::fs::read_dir(self.root.path()).unwrap().count()
    }
}

#[async_trait]
impl FetchProvider for FakeFetcher {
    async fn fetch(&self, url: &str, proxy: Option<&str>) -> Result<FetchedMedia, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls
            .lock()
            .unwrap()
            .push((url.to_string(), proxy.map(str::to_string)));

        let dir = tempfile::Builder::new()
            .prefix("vidsave_")
            .tempdir_in(self.root.path())?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.behaviour {
            FetchBehaviour::Succeed => {
                let path = dir.path().join("video.mp4");
                tokio::fs::write(&path, &self.content).await?;
                Ok(FetchedMedia::new(dir, path))
            }
            FetchBehaviour::Fail => Err(FetchError::ToolExecutionFailed {
                status: "exit status: 1".to_string(),
                stderr: "ERROR: Unsupported URL".to_string(),
            }),
            FetchBehaviour::Panic => panic!("fetch tool exploded"),
        }
    }
}

/// Successful call recorded by [`FakeSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Reference {
        chat: ChatId,
        reference: DeliveryRef,
        share_key: SourceKey,
    },
    Bytes {
        chat: ChatId,
        filename: String,
        size: usize,
        share_key: SourceKey,
    },
    Text {
        chat: ChatId,
        text: String,
    },
    UploadAction {
        chat: ChatId,
    },
}

#[allow(dead_code)]
impl Sent {
    /// Whether the user sees this message.
    pub fn is_visible(&self) -> bool {
        !matches!(self, Self::UploadAction { .. })
    }
}

/// Delivery sink recording calls, with scripted failures per operation.
#[derive(Default)]
pub struct FakeSink {
    sent: Mutex<Vec<Sent>>,
    failures: Mutex<HashMap<&'static str, VecDeque<SendError>>>,
    attempts: AtomicUsize,
    uploads: AtomicUsize,
    no_video: bool,
}

#[allow(dead_code)]
impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads succeed but return no video reference.
    pub fn without_video() -> Self {
        Self {
            no_video: true,
            ..Self::default()
        }
    }

    /// Fail next call of `operation` with `error`.
    pub fn fail_next(self, operation: &'static str, error: SendError) -> Self {
        self.failures
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(error);
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Calls visible to the user, i.e. everything except chat actions.
    pub fn visible(&self) -> Vec<Sent> {
        self.sent().into_iter().filter(Sent::is_visible).collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn call(&self, operation: &'static str, sent: Sent) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        self.sent.lock().unwrap().push(sent);
        Ok(())
    }
}

#[async_trait]
impl DeliverySink for FakeSink {
    async fn send_by_reference(
        &self,
        chat: ChatId,
        reference: &DeliveryRef,
        share_key: &SourceKey,
    ) -> Result<(), SendError> {
        self.call(
            "send_by_reference",
            Sent::Reference {
                chat,
                reference: reference.clone(),
                share_key: share_key.clone(),
            },
        )
    }

    async fn send_by_bytes(
        &self,
        chat: ChatId,
        filename: &str,
        content: &[u8],
        share_key: &SourceKey,
    ) -> Result<Option<DeliveryRef>, SendError> {
        self.call(
            "send_by_bytes",
            Sent::Bytes {
                chat,
                filename: filename.to_string(),
                size: content.len(),
                share_key: share_key.clone(),
            },
        )?;
        if self.no_video {
            return Ok(None);
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(DeliveryRef {
            id: format!("file-{}", n),
            unique_id: format!("unique-{}", n),
        }))
    }

    async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), SendError> {
        self.call(
            "send_text",
            Sent::Text {
                chat,
                text: text.to_string(),
            },
        )
    }

    async fn send_upload_action(&self, chat: ChatId) -> Result<(), SendError> {
        self.call("send_upload_action", Sent::UploadAction { chat })
    }
}

/// Store whose every operation fails, as if the database is gone.
#[derive(Clone, Default)]
pub struct FailingStore {
    upserts: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl FailingStore {
    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    fn error() -> IoError {
        IoError::new(ErrorKind::Other, "database is gone")
    }
}

#[async_trait]
impl CacheStore for FailingStore {
    type Error = IoError;

    async fn lookup_by_key(&self, _key: &SourceKey) -> Result<Option<CacheRecord>, IoError> {
        Err(Self::error())
    }

    async fn lookup_by_hash(&self, _hash: &ContentHash) -> Result<Option<CacheRecord>, IoError> {
        Err(Self::error())
    }

    async fn upsert(&self, _write: CacheWrite) -> Result<CacheRecord, IoError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Err(Self::error())
    }

    async fn find(&self, _key: &SourceKey) -> Result<Option<CacheRecord>, IoError> {
        Err(Self::error())
    }

    async fn list(&self) -> Result<Vec<CacheRecord>, IoError> {
        Err(Self::error())
    }

    async fn remove(&self, _key: &SourceKey) -> Result<bool, IoError> {
        Err(Self::error())
    }
}
