//! Pipeline worker binary.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use ytx_cache::{CacheConfig, ContentCache};
use ytx_queue::{ProcessingQueue, QueueConfig};
use ytx_worker::adapters::{GeminiDeriver, MarkdownRenderer, YtDlpSource};
use ytx_worker::{logging, metrics, Pipeline, WorkerConfig, WorkerPool};

#[derive(Debug, Parser)]
#[command(name = "ytx-worker", about = "Process queued videos into notes")]
struct Args {
    /// Exit once no pending items remain instead of polling for more
    #[arg(long)]
    until_idle: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    logging::init_tracing();
    let args = Args::parse();

    info!("Starting ytx-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = &config.metrics_addr {
        match metrics::init_metrics(addr) {
            Ok(()) => info!(addr = %addr, "Prometheus exporter listening"),
            Err(e) => warn!("Metrics disabled: {}", e),
        }
    }

    let queue = match ProcessingQueue::open(QueueConfig::from_env()).await {
        Ok(q) => Arc::new(q),
        Err(e) => {
            error!("Failed to open queue: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(warning) = queue.load_warning() {
        warn!("{}", warning);
    }

    let cache = match ContentCache::open(CacheConfig::from_env()).await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to open cache: {}", e);
            std::process::exit(1);
        }
    };

    let deriver = match GeminiDeriver::from_env() {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to create Gemini client: {}", e);
            std::process::exit(1);
        }
    };

    let pipeline = Arc::new(Pipeline::new(
        &config,
        queue,
        cache,
        Arc::new(YtDlpSource::new(&config.work_dir, config.attempt_timeout)),
        Arc::new(deriver),
        Arc::new(MarkdownRenderer::new(&config.output_dir)),
    ));
    let pool = Arc::new(WorkerPool::new(&config, pipeline));

    let report = if args.until_idle {
        pool.run_until_idle().await
    } else {
        let signal_pool = Arc::clone(&pool);
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
            signal_pool.shutdown();
        });
        pool.run().await
    };

    info!(
        completed = report.completed,
        failed = report.failed,
        "Worker shutdown complete"
    );
}
