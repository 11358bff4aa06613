use std::convert::Infallible;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use directories::ProjectDirs;

use vidsave::coordinator::DownloadOptions;
use vidsave::delivery::{TelegramSink, DEFAULT_API_URL, TELEGRAM_UPLOAD_LIMIT};
use vidsave::link::AllowedHosts;

const MIB: u64 = 1024 * 1024;

/// Calculate default database path based on OS.
fn default_database_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "vidsave") {
        proj_dirs.cache_dir().join("vidsave.sqlite")
    } else {
        PathBuf::from(".vidsave/vidsave.sqlite")
    }
}

/// Lenient boolean used for switches set from the environment.
fn parse_flag(value: &str) -> Result<bool, Infallible> {
    Ok(matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    ))
}

/// Runtime configuration, read from arguments or environment.
#[derive(clap::Args, Clone, Debug)]
pub struct Config {
    /// Telegram bot token.
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Comma-separated list of accepted link hosts, optionally with port.
    #[arg(
        long,
        env = "ALLOWED_HOSTS",
        value_name = "HOSTS",
        default_value = "tiktok.com,www.tiktok.com,instagram.com,www.instagram.com"
    )]
    pub allowed_hosts: AllowedHosts,

    /// Maximum size of a fetched video in megabytes.
    #[arg(long, env = "MAX_DOWNLOAD_MB", value_name = "MB", default_value_t = 200)]
    pub max_download_mb: u64,

    /// Proxy for the fetch tool, e.g. `socks5://127.0.0.1:1080`.
    #[arg(long, env = "PROXY")]
    pub proxy: Option<String>,

    /// Skip TLS certificate verification of the Bot API server.
    ///
    /// From the environment `1`, `true`, `yes` and `y` enable it, anything else disables it.
    #[arg(
        long,
        env = "INSECURE_SKIP_VERIFY",
        action = clap::ArgAction::SetTrue,
        value_parser = parse_flag,
    )]
    pub insecure_skip_verify: bool,

    /// Path to media cache database file.
    #[arg(
        short = 'd',
        long,
        env = "DATABASE_URL",
        value_name = "PATH",
        default_value = default_database_path().into_os_string(),
    )]
    pub database: PathBuf,

    /// Maximum number of database connections.
    #[arg(long, env = "DATABASE_POOL_SIZE")]
    pub database_pool_size: Option<usize>,

    /// Bot API server.
    #[arg(long, env = "TELEGRAM_API_URL", default_value = DEFAULT_API_URL)]
    pub telegram_api_url: String,

    /// Path to `yt-dlp` executable.
    #[arg(long, env = "YTDLP_PATH", value_name = "PATH", default_value = "yt-dlp")]
    pub ytdlp_path: PathBuf,

    /// Caption attached to sent videos.
    #[arg(long, env = "VIDEO_CAPTION")]
    pub video_caption: Option<String>,

    /// Seconds between "uploading video" indicators. Zero disables them.
    #[arg(long, env = "PROGRESS_INTERVAL_SECS", value_name = "SECS", default_value_t = 4)]
    pub progress_interval_secs: u64,
}

impl Config {
    pub fn download_options(&self) -> anyhow::Result<DownloadOptions> {
        let options = DownloadOptions::builder()
            .max_download_bytes(self.max_download_mb.saturating_mul(MIB))
            .transport_max_bytes(TELEGRAM_UPLOAD_LIMIT)
            .proxy(self.proxy.clone().filter(|p| !p.trim().is_empty()))
            .progress_interval(Duration::from_secs(self.progress_interval_secs))
            .build()?;
        Ok(options)
    }

    pub fn telegram_sink(&self) -> anyhow::Result<TelegramSink> {
        let token = self
            .bot_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .context("BOT_TOKEN is required")?;
        let sink = TelegramSink::builder(token)
            .api_url(self.telegram_api_url.clone())
            .caption(self.video_caption.clone())
            .accept_invalid_certs(self.insecure_skip_verify)
            .build()
            .context("failed to initialize Bot API client")?;
        Ok(sink)
    }
}
