//! Outbound messaging: sending media and text back to the requester.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::SendError;
use crate::record::{DeliveryRef, SourceKey};

mod backoff;
mod telegram;

pub use backoff::{BackoffPolicy, Throttled};
pub use telegram::{TelegramSink, TelegramSinkBuilder, DEFAULT_API_URL, TELEGRAM_UPLOAD_LIMIT};

/// Conversation to deliver to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Messaging platform seen by the download pipeline.
///
/// `share_key` is attached to sent media so the recipient can forward it later by key.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Re-send media already stored on the platform.
    async fn send_by_reference(
        &self,
        chat: ChatId,
        reference: &DeliveryRef,
        share_key: &SourceKey,
    ) -> Result<(), SendError>;

    /// Upload raw media.
    ///
    /// Returns reference of the uploaded media, or `None` if the platform accepted the message
    /// but reported no reusable video.
    async fn send_by_bytes(
        &self,
        chat: ChatId,
        filename: &str,
        content: &[u8],
        share_key: &SourceKey,
    ) -> Result<Option<DeliveryRef>, SendError>;

    /// Send plain text message.
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), SendError>;

    /// Show "uploading video" indicator.
    async fn send_upload_action(&self, _chat: ChatId) -> Result<(), SendError> {
        Ok(())
    }
}
