//! Download pipeline: cache lookup, fetch, deduplication, delivery and persisting.
//!
//! ```text
//! lookup_by_key ──hit──> send_by_reference
//!      │miss
//!      v
//!    fetch ──> size check ──> hash ──> lookup_by_hash ──hit──> send_by_reference ──ok──> upsert
//!                                          │miss                    │failed
//!                                          v                        v
//!                                      send_by_bytes <──────────────┘
//!                                          │
//!                                          v
//!                                        upsert
//! ```
//!
//! Cache errors never fail a request: lookups degrade to a miss and writes are only logged.

use std::future::Future;
use std::time::Duration;

use derive_builder::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::delivery::{ChatId, DeliverySink, TELEGRAM_UPLOAD_LIMIT};
use crate::errors::{DownloadError, SizeLimit};
use crate::fetch::{FetchProvider, FetchedMedia};
use crate::link::ResolvedLink;
use crate::record::{CacheRecord, CacheWrite, ContentHash, DeliveryRef, SourceKey};
use crate::store::CacheStore;

/// Default operator limit on fetched media.
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 200 * 1024 * 1024;

/// Default period of "uploading video" indicator.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(4);

/// Download options. Use [`DownloadOptionsBuilder`] to create.
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
#[builder(setter(into))]
pub struct DownloadOptions {
    /// Operator configured size limit, checked first.
    #[builder(default = "DEFAULT_MAX_DOWNLOAD_BYTES")]
    pub max_download_bytes: u64,

    /// Upload limit of the messaging platform.
    #[builder(default = "TELEGRAM_UPLOAD_LIMIT")]
    pub transport_max_bytes: u64,

    /// Proxy passed to the fetch provider.
    #[builder(default)]
    pub proxy: Option<String>,

    /// How often to show the "uploading video" indicator. Zero disables it.
    #[builder(default = "DEFAULT_PROGRESS_INTERVAL")]
    pub progress_interval: Duration,
}

impl DownloadOptions {
    /// Create new builder for download options.
    pub fn builder() -> DownloadOptionsBuilder {
        DownloadOptionsBuilder::default()
    }

    /// Check `size` against both limits, configured one first.
    pub fn check_size(&self, size: u64) -> Result<(), DownloadError> {
        let limits = [
            (SizeLimit::Configured, self.max_download_bytes),
            (SizeLimit::Transport, self.transport_max_bytes),
        ];
        match limits.into_iter().find(|(_, max)| size > *max) {
            Some((limit, max)) => Err(DownloadError::SizeExceeded { limit, size, max }),
            None => Ok(()),
        }
    }
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            transport_max_bytes: TELEGRAM_UPLOAD_LIMIT,
            proxy: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// How a request was served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Sent by reference stored for the same source.
    Cached(CacheRecord),

    /// Fetched, but identical content was already uploaded for another source.
    Deduplicated {
        source_key: SourceKey,
        reference: DeliveryRef,
    },

    /// Fetched and uploaded. Not cached if the platform returned no reference.
    Uploaded {
        source_key: SourceKey,
        reference: Option<DeliveryRef>,
        size_bytes: i64,
    },
}

/// Race `fut` against `cancel`.
async fn cancellable<T, E, Fut>(cancel: &CancellationToken, fut: Fut) -> Result<T, DownloadError>
where
    Fut: Future<Output = Result<T, E>>,
    DownloadError: From<E>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DownloadError::Cancelled),
        result = fut => result.map_err(Into::into),
    }
}

/// Serves resolved links from cache or by fetching them.
#[derive(Debug, Clone)]
pub struct Coordinator<S, F, D> {
    store: S,
    fetcher: F,
    sink: D,
    options: DownloadOptions,
}

impl<S, F, D> Coordinator<S, F, D>
where
    S: CacheStore,
    F: FetchProvider,
    D: DeliverySink,
{
    pub fn new(store: S, fetcher: F, sink: D, options: DownloadOptions) -> Self {
        Self {
            store,
            fetcher,
            sink,
            options,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Deliver video behind `link` to `chat`.
    ///
    /// # Errors
    ///
    /// Fails if the video can't be fetched, is too large, or can't be sent. Returns
    /// [`DownloadError::Cancelled`] as soon as `cancel` is triggered.
    pub async fn deliver(
        &self,
        chat: ChatId,
        link: &ResolvedLink,
        cancel: &CancellationToken,
    ) -> Result<Delivery, DownloadError> {
        let key = link.source_key();

        match self.store.lookup_by_key(&key).await {
            Ok(Some(record)) => {
                info!(%key, hits = record.hit_count, "cache hit");
                cancellable(
                    cancel,
                    self.sink.send_by_reference(chat, &record.delivery_ref, &key),
                )
                .await?;
                return Ok(Delivery::Cached(record));
            }
            Ok(None) => debug!(%key, "cache miss"),
            Err(err) => warn!(%key, error = %err, "cache lookup failed, treating as miss"),
        }

        let progress = cancel.child_token();
        let (result, ()) = tokio::join!(
            async {
                let result = self.fetch_and_deliver(chat, link, &key, cancel).await;
                progress.cancel();
                result
            },
            self.report_progress(chat, &progress),
        );
        result
    }

    /// Show upload indicator every `progress_interval` until `stop` is triggered.
    async fn report_progress(&self, chat: ChatId, stop: &CancellationToken) {
        if self.options.progress_interval.is_zero() {
            return;
        }
        let mut interval = tokio::time::interval(self.options.progress_interval);
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                _ = stop.cancelled() => break,
                result = self.sink.send_upload_action(chat) => {
                    if let Err(err) = result {
                        debug!(%chat, error = %err, "failed to send upload action");
                    }
                }
            }
        }
    }

    async fn fetch_and_deliver(
        &self,
        chat: ChatId,
        link: &ResolvedLink,
        key: &SourceKey,
        cancel: &CancellationToken,
    ) -> Result<Delivery, DownloadError> {
        info!(%key, url = %link.url, "fetching");
        let media = cancellable(
            cancel,
            self.fetcher.fetch(&link.url, self.options.proxy.as_deref()),
        )
        .await?;
        let result = self.deliver_fetched(chat, link, key, &media, cancel).await;
        media.cleanup();
        result
    }

    async fn deliver_fetched(
        &self,
        chat: ChatId,
        link: &ResolvedLink,
        key: &SourceKey,
        media: &FetchedMedia,
        cancel: &CancellationToken,
    ) -> Result<Delivery, DownloadError> {
        let size = tokio::fs::metadata(media.path()).await?.len();
        if let Err(err) = self.options.check_size(size) {
            warn!(%key, size, "fetched media is too large");
            return Err(err);
        }

        let content = tokio::fs::read(media.path()).await?;
        let size = content.len() as u64;
        self.options.check_size(size)?;
        let size_bytes = i64::try_from(size).unwrap_or(i64::MAX);
        let hash = ContentHash::of(&content);
        debug!(%key, size, %hash, "media hashed");

        match self.store.lookup_by_hash(&hash).await {
            Ok(Some(existing)) => {
                info!(%key, existing = %existing.source_key, "same content already uploaded");
                let sent = cancellable(
                    cancel,
                    self.sink.send_by_reference(chat, &existing.delivery_ref, key),
                )
                .await;
                match sent {
                    Ok(()) => {
                        self.persist(CacheWrite {
                            source_key: key.clone(),
                            content_hash: hash,
                            delivery_ref: existing.delivery_ref.clone(),
                            size_bytes,
                        })
                        .await;
                        return Ok(Delivery::Deduplicated {
                            source_key: key.clone(),
                            reference: existing.delivery_ref,
                        });
                    }
                    Err(DownloadError::Cancelled) => return Err(DownloadError::Cancelled),
                    Err(err) => {
                        warn!(%key, error = %err, "existing reference failed, uploading fresh copy")
                    }
                }
            }
            Ok(None) => debug!(%key, "no duplicate content"),
            Err(err) => warn!(%key, error = %err, "hash lookup failed, treating as miss"),
        }

        let filename = format!("{}.mp4", link.video_id);
        let reference = cancellable(
            cancel,
            self.sink.send_by_bytes(chat, &filename, &content, key),
        )
        .await?;

        match &reference {
            Some(reference) => {
                self.persist(CacheWrite {
                    source_key: key.clone(),
                    content_hash: hash,
                    delivery_ref: reference.clone(),
                    size_bytes,
                })
                .await
            }
            None => warn!(%key, "upload returned no video reference, nothing cached"),
        }

        Ok(Delivery::Uploaded {
            source_key: key.clone(),
            reference,
            size_bytes,
        })
    }

    async fn persist(&self, write: CacheWrite) {
        let key = write.source_key.clone();
        match self.store.upsert(write).await {
            Ok(record) => info!(%key, hash = %record.content_hash, "cached"),
            Err(err) => error!(%key, error = %err, "failed to persist cache record"),
        }
    }
}
