//! CLI command definitions for crusty.
//!
//! `add`, `list`, `show` and `stats` run in client mode: they talk to Redis
//! only and never open the content store, so they can run while a server holds
//! its lock. `server` and `snapshot` open the content store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::article::Article;
use crate::extract::{Extractor, HttpExtractor};
use crate::scheduler::{WorkerPool, WorkerPoolConfig};
use crate::store::{ArticleStore, ContentKey, ContentStore, HybridStore, StoreConfig};

/// Default Redis URL.
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default content store directory.
const DEFAULT_CONTENT_PATH: &str = "./crusty-data";

/// Default number of articles shown by `list`.
const DEFAULT_LIST_LIMIT: usize = 10;

/// Read-it-later buffer: queue URLs now, archive their content in the background.
#[derive(Parser)]
#[command(name = "crusty")]
#[command(about = "Queue web articles and archive their readable content")]
#[command(version)]
#[command(
    long_about = "crusty queues article URLs in Redis and archives their readable content in a local store.\n\nRun one `crusty server` to process the queue; `add`, `list`, `show` and `stats` can run alongside it.\n\nExample usage:\n  crusty server --workers 4\n  crusty add https://example.com/post"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Redis connection URL.
    #[arg(long, env = "CRUSTY_REDIS_URL", default_value = DEFAULT_REDIS_URL, global = true)]
    pub redis_url: String,

    /// Content store directory (server and snapshot only).
    #[arg(long, env = "CRUSTY_CONTENT_PATH", default_value = DEFAULT_CONTENT_PATH, global = true)]
    pub content_path: PathBuf,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run the archiving workers until interrupted.
    Server(ServerArgs),

    /// Queue a URL for archiving.
    Add(AddArgs),

    /// List recently added articles, newest first.
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show one article.
    Show(ShowArgs),

    /// Show queue statistics.
    Stats,

    /// Extract a URL immediately and store its content by URL hash.
    Snapshot(SnapshotArgs),
}

/// Arguments for `crusty server`.
#[derive(Parser, Debug)]
pub struct ServerArgs {
    /// Number of concurrent workers.
    #[arg(short = 'w', long, env = "CRUSTY_WORKERS", default_value = "1")]
    pub workers: usize,
}

/// Arguments for `crusty add`.
#[derive(Parser, Debug)]
pub struct AddArgs {
    /// Article URL (http or https).
    pub url: String,
}

/// Arguments for `crusty list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Maximum number of articles to show.
    #[arg(short = 'n', long, default_value_t = DEFAULT_LIST_LIMIT)]
    pub limit: usize,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `crusty show`.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Article id.
    pub id: Uuid,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Open the content store and include the archived content. Fails while a
    /// server holds the store.
    #[arg(long)]
    pub with_content: bool,
}

/// Arguments for `crusty snapshot`.
#[derive(Parser, Debug)]
pub struct SnapshotArgs {
    /// Page URL (http or https).
    pub url: String,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = StoreConfig::new(cli.redis_url.clone());

    match cli.command {
        Commands::Server(args) => {
            run_server_command(args, config.with_content_path(cli.content_path)).await
        }
        Commands::Add(args) => run_add_command(args, config).await,
        Commands::List(args) => run_list_command(args, config).await,
        Commands::Show(args) => {
            let config = if args.with_content {
                config.with_content_path(cli.content_path)
            } else {
                config
            };
            run_show_command(args, config).await
        }
        Commands::Stats => run_stats_command(config).await,
        Commands::Snapshot(args) => run_snapshot_command(args, cli.content_path).await,
    }
}

async fn open_store(config: StoreConfig) -> anyhow::Result<HybridStore> {
    let redis_url = config.redis_url.clone();
    HybridStore::open(config)
        .await
        .with_context(|| format!("Failed to open article store (redis: {})", redis_url))
}

// ============================================================================
// Server
// ============================================================================

async fn run_server_command(args: ServerArgs, config: StoreConfig) -> anyhow::Result<()> {
    if args.workers == 0 {
        anyhow::bail!("--workers must be at least 1");
    }

    let store = Arc::new(open_store(config).await?);
    let extractor: Arc<dyn Extractor> =
        Arc::new(HttpExtractor::new().context("Failed to build HTTP client")?);

    let mut pool = WorkerPool::new(
        WorkerPoolConfig::new(args.workers),
        Arc::clone(&store) as Arc<dyn ArticleStore>,
        extractor,
    );
    pool.start()?;

    info!(workers = args.workers, "Server running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutdown requested");
    if let Err(e) = pool.shutdown().await {
        warn!(error = %e, "Workers did not stop cleanly");
    }

    let stats = pool.stats();
    info!(
        archived = stats.jobs_archived,
        failed = stats.jobs_failed,
        dropped = stats.jobs_dropped,
        "Worker pool summary"
    );

    store.close().await.context("Failed to flush content store")?;
    Ok(())
}

// ============================================================================
// Client commands
// ============================================================================

async fn run_add_command(args: AddArgs, config: StoreConfig) -> anyhow::Result<()> {
    let url = HttpExtractor::parse_url(&args.url)?;
    let store = open_store(config).await?;

    let article = Article::new(url.as_str());
    store
        .save(&article)
        .await
        .with_context(|| format!("Failed to queue {}", url))?;

    info!(job_id = %article.id, url = %url, "Queued article");
    println!("{}", article.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ListEntry<'a> {
    id: Uuid,
    status: &'a str,
    url: &'a str,
    title: &'a str,
}

async fn run_list_command(args: ListArgs, config: StoreConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let articles = store.list(args.limit).await.context("Failed to list articles")?;

    if args.json {
        let entries: Vec<_> = articles
            .iter()
            .map(|a| ListEntry {
                id: a.id,
                status: a.status.as_str(),
                url: &a.url,
                title: &a.title,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if articles.is_empty() {
        println!("No articles yet. Queue one with `crusty add <url>`.");
        return Ok(());
    }

    for article in &articles {
        let title = if article.title.is_empty() {
            "-"
        } else {
            &article.title
        };
        println!(
            "{}  {:<8}  {}  {}",
            article.id, article.status, article.url, title
        );
    }
    Ok(())
}

async fn run_show_command(args: ShowArgs, config: StoreConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let article = store
        .get(args.id)
        .await
        .with_context(|| format!("Failed to load article {}", args.id))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&article)?);
        return Ok(());
    }

    print!("{}", render_article(&article));
    Ok(())
}

fn render_article(article: &Article) -> String {
    let mut out = String::new();
    out.push_str(&format!("ID:       {}\n", article.id));
    out.push_str(&format!("URL:      {}\n", article.url));
    out.push_str(&format!("Status:   {}\n", article.status));
    out.push_str(&format!(
        "Created:  {}\n",
        article.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(archived_at) = article.archived_at {
        out.push_str(&format!(
            "Archived: {}\n",
            archived_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    if !article.title.is_empty() {
        out.push_str(&format!("Title:    {}\n", article.title));
    }
    if !article.excerpt.is_empty() {
        out.push_str(&format!("Excerpt:  {}\n", article.excerpt));
    }
    if !article.error_message.is_empty() {
        out.push_str(&format!("Error:    {}\n", article.error_message));
    }
    if article.has_content() {
        out.push('\n');
        out.push_str(&article.content);
        out.push('\n');
    }
    out
}

async fn run_stats_command(config: StoreConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let stats = store.stats().await.context("Failed to read queue stats")?;

    println!("Pending jobs:   {}", stats.pending_jobs);
    println!("Recent entries: {}", stats.recent_entries);
    Ok(())
}

// ============================================================================
// Snapshot
// ============================================================================

async fn run_snapshot_command(args: SnapshotArgs, content_path: PathBuf) -> anyhow::Result<()> {
    let url = HttpExtractor::parse_url(&args.url)?;
    let store = ContentStore::open(&content_path).with_context(|| {
        format!(
            "Failed to open content store at {} (is a server running?)",
            content_path.display()
        )
    })?;

    let extractor = HttpExtractor::new().context("Failed to build HTTP client")?;
    let key = snapshot(&store, &extractor, url.as_str()).await?;

    store.flush().await?;
    println!("{}", key);
    Ok(())
}

/// Extracts `url` and stores its content under the URL's content key.
async fn snapshot(
    store: &ContentStore,
    extractor: &dyn Extractor,
    url: &str,
) -> anyhow::Result<ContentKey> {
    let key = ContentKey::for_source(url);
    if store.contains(&key).await? {
        anyhow::bail!("{} is already archived as {}", url, key);
    }

    let extracted = extractor
        .extract(url, WorkerPoolConfig::default().extraction_timeout)
        .await
        .with_context(|| format!("Failed to extract {}", url))?;
    if extracted.content.trim().is_empty() {
        anyhow::bail!("{} has no readable content", url);
    }

    store.put(&key, &extracted.content).await?;
    info!(url = %url, key = %key, title = %extracted.title, "Snapshot stored");
    Ok(key)
}
