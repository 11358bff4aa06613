//! Recognition of supported short-video links.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::errors::LinkError;
use crate::record::SourceKey;

/// Hosts accepted when no allow-list is configured.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &[
    "tiktok.com",
    "www.tiktok.com",
    "instagram.com",
    "www.instagram.com",
];

/// Supported video platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    TikTok,
    Instagram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TikTok => "tiktok",
            Self::Instagram => "instagram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive set of accepted hosts.
///
/// Entries may be bare hostnames (`tiktok.com`) or carry a port (`localhost:8080`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedHosts(HashSet<String>);

impl AllowedHosts {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            hosts
                .into_iter()
                .map(|host| host.as_ref().trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, host: &str) -> bool {
        self.0.contains(&host.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check URL authority against the list.
    ///
    /// Matches when any of `host:port` as written, bare hostname or `hostname:<effective port>`
    /// is in the list.
    fn allows(&self, url: &Url) -> bool {
        let Some(hostname) = url.host_str() else {
            return false;
        };
        if self.contains(hostname) {
            return true;
        }
        if let Some(port) = url.port() {
            if self.contains(&format!("{}:{}", hostname, port)) {
                return true;
            }
        }
        url.port_or_known_default()
            .is_some_and(|port| self.contains(&format!("{}:{}", hostname, port)))
    }
}

impl Default for AllowedHosts {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_HOSTS)
    }
}

impl FromStr for AllowedHosts {
    type Err = std::convert::Infallible;

    /// Parse comma-separated list.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.split(',')))
    }
}

/// Link recognized as a supported video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    pub platform: Platform,

    /// Platform specific video ID. Never contains `:`.
    pub video_id: String,

    /// Link as sent by the user, trimmed.
    pub url: String,
}

impl ResolvedLink {
    /// Cache key of the linked video.
    pub fn source_key(&self) -> SourceKey {
        SourceKey::new(self.platform, &self.video_id)
    }
}

fn tiktok_path() -> &'static Regex {
    static TIKTOK_PATH: OnceLock<Regex> = OnceLock::new();
    TIKTOK_PATH.get_or_init(|| {
        Regex::new(r"^/@([^/]+)/video/(\d+)/?$").expect("valid TikTok path regex")
    })
}

fn instagram_path() -> &'static Regex {
    static INSTAGRAM_PATH: OnceLock<Regex> = OnceLock::new();
    INSTAGRAM_PATH.get_or_init(|| {
        Regex::new(r"^/reel/([A-Za-z0-9_-]+)/?$").expect("valid Instagram path regex")
    })
}

/// Turns raw user text into a [`ResolvedLink`].
#[derive(Debug, Clone, Default)]
pub struct LinkResolver {
    allowed_hosts: AllowedHosts,
}

impl LinkResolver {
    pub fn new(allowed_hosts: AllowedHosts) -> Self {
        Self { allowed_hosts }
    }

    /// Resolve `text` into platform and video ID.
    pub fn resolve(&self, text: &str) -> Result<ResolvedLink, LinkError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LinkError::NotAUrl);
        }
        let url = Url::parse(text).map_err(|err| {
            debug!(error = %err, "failed to parse link");
            LinkError::NotAUrl
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(LinkError::NotAUrl);
        }
        if !self.allowed_hosts.allows(&url) {
            debug!(host = ?url.host_str(), "host is not allowed");
            return Err(LinkError::HostNotAllowed);
        }

        let path = url.path();
        let (platform, video_id) = if let Some(captures) = tiktok_path().captures(path) {
            (Platform::TikTok, captures[2].to_string())
        } else if let Some(captures) = instagram_path().captures(path) {
            (Platform::Instagram, captures[1].to_string())
        } else {
            return Err(LinkError::UnrecognizedFormat);
        };

        Ok(ResolvedLink {
            platform,
            video_id,
            url: text.to_string(),
        })
    }
}
