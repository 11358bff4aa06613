//! Error types.

use std::fmt;
use std::io::Error as IoError;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Non UTF-8 symbol in path.
#[derive(thiserror::Error, Debug)]
#[error("non-UTF-8 symbol in path")]
pub struct NonUtf8PathError;

/// Reason why an inbound text was not accepted as a video link.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Text is not an absolute `http(s)` URL.
    #[error("not a valid url")]
    NotAUrl,

    /// Host (or `host:port`) is not in the allow-list.
    #[error("host not allowed")]
    HostNotAllowed,

    /// Host is allowed, but the path matches no known video format.
    #[error("unknown link format")]
    UnrecognizedFormat,
}

impl LinkError {
    /// Message shown to the user who sent the link.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotAUrl => "That doesn't look like a link 🧐",
            Self::HostNotAllowed => {
                "This domain is not supported 😕\n\nOnly TikTok and Instagram links for now."
            }
            Self::UnrecognizedFormat => {
                "Can't make sense of this link 🤔\nSend a direct link to the video."
            }
        }
    }
}

/// Fetch provider error.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// External fetch tool exited unsuccessfully.
    #[error("fetch tool failed ({status}): {stderr}")]
    ToolExecutionFailed { status: String, stderr: String },

    /// Fetch tool succeeded, but no media file can be found.
    #[error("fetch tool produced no output file")]
    NoOutputProduced,

    /// Failed to prepare temporary directory or to spawn the tool.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

/// Delivery sink error.
#[derive(thiserror::Error, Debug)]
pub enum SendError {
    /// Messaging platform asks to slow down.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Messaging platform rejected the request.
    #[error("API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request body could not be encoded, nothing was sent.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SendError {
    /// Whether the error is a rate-limit signal, which is worth retrying.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Authority which imposes a size ceiling on delivered media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeLimit {
    /// Operator-configured maximum.
    Configured,

    /// Hard limit of the messaging platform.
    Transport,
}

impl fmt::Display for SizeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configured => write!(f, "configured"),
            Self::Transport => write!(f, "transport"),
        }
    }
}

/// Failure of a single download request.
#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("failed to fetch media: {0}")]
    Fetch(#[from] FetchError),

    #[error("media size {size} bytes exceeds {limit} limit of {max} bytes")]
    SizeExceeded {
        limit: SizeLimit,
        size: u64,
        max: u64,
    },

    #[error("failed to read fetched media: {0}")]
    Io(#[from] IoError),

    #[error("failed to deliver media: {0}")]
    Delivery(#[from] SendError),

    #[error("request cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Message shown to the user, if any.
    ///
    /// Cancelled requests produce no message.
    pub fn user_message(&self) -> Option<String> {
        let message = match self {
            Self::Fetch(_) => "Couldn't download the video 😕\nPlease try again later.".to_string(),
            Self::SizeExceeded {
                limit: SizeLimit::Configured,
                size,
                max,
            } => format!(
                "The video is too large ({} MB), the limit is {} MB 😬",
                size / MIB,
                max / MIB
            ),
            Self::SizeExceeded {
                limit: SizeLimit::Transport,
                size,
                max,
            } => format!(
                "The video is too large for Telegram ({} MB), the limit is {} MB 😬",
                size / MIB,
                max / MIB
            ),
            Self::Io(_) => "Failed to read the downloaded file 😕".to_string(),
            Self::Delivery(_) => "Couldn't send the video 😢".to_string(),
            Self::Cancelled => return None,
        };
        Some(message)
    }
}
