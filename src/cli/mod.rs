use anyhow::Context;
use clap::Parser;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::info;

use vidsave::delivery::{BackoffPolicy, ChatId, Throttled};
use vidsave::errors::NonUtf8PathError;
use vidsave::fetch::YtDlp;
use vidsave::handler::{Outcome, RequestHandler};
use vidsave::link::LinkResolver;
use vidsave::record::{CacheRecord, SourceKey};
use vidsave::sqlite::SqliteCacheStore;
use vidsave::store::CacheStore;
use vidsave::Coordinator;

mod config;

pub use config::Config;

/// CLI interface of vidsave.
#[derive(Parser, Clone, Debug)]
#[command(version, about = "Short video relay bot: fetch links and manage media cache")]
pub struct Cli {
    #[command(flatten)]
    config: Config,

    /// Enable debug logging, unless `RUST_LOG` is set.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to execute.
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let database = self
            .config
            .database
            .as_os_str()
            .to_str()
            .ok_or(NonUtf8PathError)
            .context("failed to open database file")?;

        // Ensure database file has its parent directory
        if let Some(parent_dir) = self.config.database.parent() {
            if !parent_dir.as_os_str().is_empty() {
                fs::create_dir_all(parent_dir)
                    .await
                    .context("failed to create database directory")?;
            }
        }

        let store = SqliteCacheStore::open(database, self.config.database_pool_size)
            .await
            .context("failed to open media cache")?;

        self.command.execute(&self.config, store).await
    }
}

/// vidsave commands.
#[derive(Clone, Debug, clap::Subcommand)]
pub enum Command {
    /// Deliver a single link to a chat, exactly as the bot would.
    ///
    /// Press Ctrl-C to cancel.
    Fetch {
        /// Link to a video.
        link: String,

        /// Chat to send the video to.
        #[arg(long, allow_negative_numbers = true)]
        chat_id: i64,
    },

    /// Print cached video reference for a share query.
    Share {
        /// Source key, e.g. `tiktok:7234567890123456789`.
        key: String,
    },

    /// Manage media cache.
    #[command(subcommand)]
    Cache(CacheCommand),
}

impl Command {
    pub async fn execute(&self, config: &Config, store: SqliteCacheStore) -> anyhow::Result<()> {
        match self {
            Self::Fetch { link, chat_id } => {
                let sink = Throttled::new(config.telegram_sink()?, BackoffPolicy::default());
                let fetcher = YtDlp::new(&config.ytdlp_path);
                let coordinator =
                    Coordinator::new(store, fetcher, sink, config.download_options()?);
                let handler =
                    RequestHandler::new(LinkResolver::new(config.allowed_hosts.clone()), coordinator);

                let cancel = CancellationToken::new();
                let ctrl_c = {
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if tokio::signal::ctrl_c().await.is_ok() {
                            info!("interrupted, cancelling request");
                            cancel.cancel();
                        }
                    })
                };
                let outcome = handler.handle_text(ChatId(*chat_id), link, &cancel).await;
                ctrl_c.abort();

                match outcome {
                    Outcome::Delivered(delivery) => println!("{:#?}", delivery),
                    Outcome::Rejected(err) => anyhow::bail!("link rejected: {}", err),
                    Outcome::Failed(err) => return Err(err).context("request failed"),
                    Outcome::Panicked => anyhow::bail!("request panicked"),
                    Outcome::Empty => anyhow::bail!("empty link"),
                }
            }
            Self::Share { key } => {
                let key = key.trim();
                match store.lookup_by_key(&SourceKey::from_raw(key)).await? {
                    Some(record) => println!("{}", record.delivery_ref.id),
                    None => anyhow::bail!("nothing cached for {}", key),
                }
            }
            Self::Cache(cmd) => {
                cmd.execute(&store).await?;
            }
        }
        Ok(())
    }
}

/// Cache manipulations subcommand.
#[derive(Clone, Debug, clap::Subcommand)]
pub enum CacheCommand {
    /// Find cached source without counting a hit.
    Find {
        /// Source key to find.
        key: String,
    },

    /// List all cache entries, most recently used first.
    List,

    /// Remove source from cache.
    ///
    /// The record is only marked as deleted, next delivery of the same source replaces it.
    Remove {
        /// Source key to remove.
        key: String,
    },
}

fn print_record(record: &CacheRecord) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

impl CacheCommand {
    pub async fn execute(&self, store: &SqliteCacheStore) -> anyhow::Result<()> {
        match self {
            Self::Find { key } => {
                if let Some(record) = store.find(&SourceKey::from_raw(key.trim())).await? {
                    print_record(&record)?;
                }
            }
            Self::List => {
                for record in store.list().await? {
                    print_record(&record)?;
                }
            }
            Self::Remove { key } => {
                if !store.remove(&SourceKey::from_raw(key.trim())).await? {
                    anyhow::bail!("nothing cached for {}", key.trim());
                }
            }
        }
        Ok(())
    }
}
