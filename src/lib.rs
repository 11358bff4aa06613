//! # vidsave
//!
//! Core of a chat bot relaying short videos (TikTok, Instagram reels): links are resolved to a
//! stable source key, media is fetched with `yt-dlp`, delivered through the Telegram Bot API
//! and remembered, so the same video is never downloaded twice.
//!
//! ## Example
//!
//! ```rust,no_run
//! # tokio_test::block_on(async {
//! use tokio_util::sync::CancellationToken;
//! use vidsave::delivery::{BackoffPolicy, ChatId, TelegramSink, Throttled};
//! use vidsave::{Coordinator, DownloadOptions, LinkResolver, RequestHandler, SqliteCacheStore, YtDlp};
//!
//! let store = SqliteCacheStore::open("vidsave.sqlite", None).await?;
//! let telegram = TelegramSink::builder("123456:bot-token").build()?;
//! let sink = Throttled::new(telegram, BackoffPolicy::default());
//! let coordinator = Coordinator::new(store, YtDlp::default(), sink, DownloadOptions::default());
//! let handler = RequestHandler::new(LinkResolver::default(), coordinator);
//!
//! let cancel = CancellationToken::new();
//! handler
//!     .handle_text(ChatId(42), "https://www.tiktok.com/@user/video/123456", &cancel)
//!     .await;
//! # Ok::<(), anyhow::Error>(())
//! # }).unwrap();
//! ```

pub mod coordinator;
pub mod delivery;
pub mod errors;
pub mod fetch;
pub mod handler;
pub mod link;
pub mod record;
pub mod sqlite;
pub mod store;

pub use coordinator::{Coordinator, Delivery, DownloadOptions};
pub use fetch::{FetchProvider, FetchedMedia, YtDlp};
pub use handler::{Outcome, RequestHandler};
pub use link::{LinkResolver, Platform, ResolvedLink};
pub use record::{CacheRecord, ContentHash, DeliveryRef, SourceKey};
pub use sqlite::SqliteCacheStore;
pub use store::CacheStore;

// Re-exports of public API arguments from extern crates
#[doc(no_inline)]
pub use chrono::{DateTime, Utc};
#[doc(no_inline)]
pub use tokio_util::sync::CancellationToken;
