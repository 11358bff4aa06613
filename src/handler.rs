//! Per-request boundary: turns user text into exactly one reply.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::coordinator::{Coordinator, Delivery};
use crate::delivery::{ChatId, DeliverySink};
use crate::errors::{DownloadError, LinkError};
use crate::fetch::FetchProvider;
use crate::link::LinkResolver;
use crate::record::{CacheRecord, SourceKey};
use crate::store::CacheStore;

pub const SEND_LINK_PROMPT: &str = "Send me a link as text.";
pub const INTERNAL_ERROR_MESSAGE: &str = "❌ Internal error. Please try again later.";

/// Result of handling a single request.
#[derive(Debug)]
pub enum Outcome {
    /// Video was sent.
    Delivered(Delivery),

    /// Text is not a supported link.
    Rejected(LinkError),

    /// Pipeline failed. User was notified unless the request was cancelled.
    Failed(DownloadError),

    /// Pipeline panicked. User got an internal error message.
    Panicked,

    /// Nothing to handle.
    Empty,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Resolves links and runs them through [`Coordinator`], replying to the user.
#[derive(Debug, Clone)]
pub struct RequestHandler<S, F, D> {
    resolver: LinkResolver,
    coordinator: Coordinator<S, F, D>,
}

impl<S, F, D> RequestHandler<S, F, D>
where
    S: CacheStore,
    F: FetchProvider,
    D: DeliverySink,
{
    pub fn new(resolver: LinkResolver, coordinator: Coordinator<S, F, D>) -> Self {
        Self {
            resolver,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &Coordinator<S, F, D> {
        &self.coordinator
    }

    /// Handle text message from `chat`.
    ///
    /// Never panics because of the pipeline. The user receives either the video or a single
    /// text message, except for cancelled requests which get nothing.
    pub async fn handle_text(
        &self,
        chat: ChatId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Outcome {
        let text = text.trim();
        if text.is_empty() {
            self.reply(chat, SEND_LINK_PROMPT).await;
            return Outcome::Empty;
        }

        let link = match self.resolver.resolve(text) {
            Ok(link) => link,
            Err(err) => {
                info!(%chat, error = %err, "link rejected");
                self.reply(chat, err.user_message()).await;
                return Outcome::Rejected(err);
            }
        };
        info!(%chat, platform = %link.platform, video_id = %link.video_id, "handling link");

        let result = AssertUnwindSafe(self.coordinator.deliver(chat, &link, cancel))
            .catch_unwind()
            .await;
        match result {
            Ok(Ok(delivery)) => Outcome::Delivered(delivery),
            Ok(Err(err)) => {
                match err.user_message() {
                    Some(message) => {
                        error!(%chat, url = %link.url, error = %err, "request failed");
                        self.reply(chat, &message).await;
                    }
                    None => info!(%chat, url = %link.url, "request cancelled"),
                }
                Outcome::Failed(err)
            }
            Err(payload) => {
                error!(%chat, url = %link.url, panic = panic_message(payload.as_ref()), "request panicked");
                self.reply(chat, INTERNAL_ERROR_MESSAGE).await;
                Outcome::Panicked
            }
        }
    }

    /// Find cached video to share by its source key, e.g. from an inline query.
    ///
    /// Counts as a cache hit. Store errors are logged and reported as nothing found.
    pub async fn share(&self, query: &str) -> Option<CacheRecord> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        let key = SourceKey::from_raw(query);
        match self.coordinator.store().lookup_by_key(&key).await {
            Ok(record) => record,
            Err(err) => {
                warn!(%key, error = %err, "share lookup failed");
                None
            }
        }
    }

    async fn reply(&self, chat: ChatId, text: &str) {
        if let Err(err) = self.coordinator.sink().send_text(chat, text).await {
            warn!(%chat, error = %err, "failed to send reply");
        }
    }
}
