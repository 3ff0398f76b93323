//! Operator CLI for the queue and the content cache.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ytx_cache::{CacheConfig, ContentCache, Namespace};
use ytx_models::{ItemId, QueueStatus};
use ytx_queue::{ProcessingQueue, QueueConfig, QueueItem};

#[derive(Parser)]
#[command(name = "ytx-ctl")]
#[command(about = "Inspect and manage the ytx queue and cache")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Queue(QueueCommands),
    /// Content cache commands
    #[command(subcommand)]
    Cache(CacheCommands),
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Add one or more video URLs
    Add(AddArgs),
    /// Add URLs from a file, one per line (`#` starts a comment)
    AddFile(AddFileArgs),
    /// List queue items
    List(StatusFilter),
    /// Show item counts per status
    Stats,
    /// Remove items, all or by status
    Clear(StatusFilter),
    /// Remove one item
    Remove { id: String },
    /// Move an item one place earlier
    Up { id: String },
    /// Move an item one place later
    Down { id: String },
    /// Put failed items back to pending
    Retry(RetryArgs),
}

#[derive(Args)]
struct AddArgs {
    /// Video URLs
    #[arg(required = true)]
    urls: Vec<String>,

    /// Grouping label, also used as the output subdirectory
    #[arg(short, long)]
    category: Option<String>,
}

#[derive(Args)]
struct AddFileArgs {
    path: PathBuf,

    #[arg(short, long)]
    category: Option<String>,
}

#[derive(Args)]
struct StatusFilter {
    /// pending, processing, completed or failed
    #[arg(short, long)]
    status: Option<QueueStatus>,
}

#[derive(Args)]
struct RetryArgs {
    /// Item to retry
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    id: Option<String>,

    /// Retry every failed item
    #[arg(long)]
    all: bool,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show per-namespace statistics
    Stats,
    /// Delete cached entries
    Clear {
        /// raw or derived; both when omitted
        #[arg(short, long)]
        namespace: Option<Namespace>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Queue(command) => run_queue(command).await,
        Commands::Cache(command) => run_cache(command).await,
    }
}

async fn open_queue() -> Result<ProcessingQueue> {
    let queue = ProcessingQueue::open(QueueConfig::from_env())
        .await
        .context("Failed to open queue")?;
    if let Some(warning) = queue.load_warning() {
        eprintln!("warning: {}", warning);
    }
    Ok(queue)
}

async fn run_queue(command: QueueCommands) -> Result<()> {
    let queue = open_queue().await?;

    match command {
        QueueCommands::Add(args) => {
            if let [url] = args.urls.as_slice() {
                let item = queue.enqueue(url, args.category.as_deref()).await?;
                println!("Added {} {}", item.id, item.url);
            } else {
                let report = queue.enqueue_many(&args.urls, args.category.as_deref()).await?;
                print_report(&report);
            }
        }
        QueueCommands::AddFile(args) => {
            let content = tokio::fs::read_to_string(&args.path)
                .await
                .with_context(|| format!("Failed to read {}", args.path.display()))?;
            let report = queue
                .enqueue_many(content.lines(), args.category.as_deref())
                .await?;
            print_report(&report);
        }
        QueueCommands::List(filter) => {
            let items = queue.list(filter.status).await;
            if items.is_empty() {
                println!("Queue is empty");
            }
            for item in &items {
                print_item(item);
            }
        }
        QueueCommands::Stats => {
            let stats = queue.stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        QueueCommands::Clear(filter) => {
            let removed = queue.clear(filter.status).await?;
            println!("Removed {} item(s)", removed);
        }
        QueueCommands::Remove { id } => {
            if !queue.remove(&ItemId::from(id.as_str())).await? {
                bail!("No item with id {}", id);
            }
            println!("Removed {}", id);
        }
        QueueCommands::Up { id } => {
            if !queue.move_earlier(&ItemId::from(id.as_str())).await? {
                println!("{} is already first", id);
            }
        }
        QueueCommands::Down { id } => {
            if !queue.move_later(&ItemId::from(id.as_str())).await? {
                println!("{} is already last", id);
            }
        }
        QueueCommands::Retry(args) => {
            if args.all {
                let reset = queue.retry_all_failed().await?;
                println!("Reset {} failed item(s) to pending", reset);
            } else if let Some(id) = args.id {
                let item = queue.retry_failed(&ItemId::from(id)).await?;
                println!("Reset {} to pending", item.id);
            }
        }
    }
    Ok(())
}

async fn run_cache(command: CacheCommands) -> Result<()> {
    let cache = ContentCache::open(CacheConfig::from_env())
        .await
        .context("Failed to open cache")?;
    if !cache.is_enabled() {
        println!("Cache is disabled (ENABLE_CACHE=false)");
        return Ok(());
    }

    match command {
        CacheCommands::Stats => {
            for namespace in Namespace::ALL {
                let stats = cache.stats(namespace).await?;
                let oldest = stats
                    .oldest_entry_age
                    .map(|age| format!("{}h", age.as_secs() / 3600))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<8} entries={} expired={} size={}KB oldest={} ttl={}d",
                    namespace.as_str(),
                    stats.entry_count,
                    stats.expired_count,
                    stats.total_size / 1024,
                    oldest,
                    cache.ttl(namespace).as_secs() / 86_400
                );
            }
        }
        CacheCommands::Clear { namespace } => {
            let removed = cache.clear(namespace).await?;
            println!("Removed {} cache entr{}", removed, if removed == 1 { "y" } else { "ies" });
        }
    }
    Ok(())
}

fn print_report(report: &ytx_queue::EnqueueReport) {
    println!(
        "Added {}, skipped {} duplicate(s), {} invalid",
        report.added.len(),
        report.skipped_duplicates,
        report.invalid.len()
    );
    for (input, reason) in &report.invalid {
        println!("  invalid: {} ({})", input, reason);
    }
    if report.capacity_reached {
        println!("Queue is full; remaining inputs were not added");
    }
}

fn print_item(item: &QueueItem) {
    let category = item.category.as_deref().unwrap_or("-");
    println!(
        "{}  {:<10}  {:<12}  {}",
        item.id,
        item.status.as_str(),
        category,
        item.display_name()
    );
    if let Some(error) = &item.error {
        println!("          error: {}", error);
    }
    if let Some(output) = &item.output_path {
        println!("          output: {}", output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_and_cache_commands_parse() {
        let cli = Cli::try_parse_from([
            "ytx-ctl",
            "add",
            "https://youtu.be/dQw4w9WgXcQ",
            "-c",
            "talks",
        ])
        .unwrap();
        match cli.command {
            Commands::Queue(QueueCommands::Add(args)) => {
                assert_eq!(args.urls.len(), 1);
                assert_eq!(args.category.as_deref(), Some("talks"));
            }
            _ => panic!("expected add"),
        }

        let cli = Cli::try_parse_from(["ytx-ctl", "cache", "clear", "--namespace", "raw"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cache(CacheCommands::Clear {
                namespace: Some(Namespace::Raw)
            })
        ));

        let cli = Cli::try_parse_from(["ytx-ctl", "list", "--status", "failed"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Queue(QueueCommands::List(StatusFilter {
                status: Some(QueueStatus::Failed)
            }))
        ));
    }

    #[test]
    fn test_retry_needs_id_or_all() {
        assert!(Cli::try_parse_from(["ytx-ctl", "retry"]).is_err());
        assert!(Cli::try_parse_from(["ytx-ctl", "retry", "abcd1234", "--all"]).is_err());
        assert!(Cli::try_parse_from(["ytx-ctl", "retry", "--all"]).is_ok());
    }
}
