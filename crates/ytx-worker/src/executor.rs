//! Bounded worker pool.
//!
//! Runs a fixed number of worker loops, each claiming one item at a time
//! through [`Pipeline::run_next`]. Workers never share a list of pending
//! items; the queue hands each item to exactly one of them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::pipeline::{ItemOutcome, Pipeline};
use crate::retry::FailureTracker;

/// Totals over one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub completed: usize,
    pub failed: usize,
    /// Queue bookkeeping errors (claiming or recording a status)
    pub errors: usize,
}

impl PoolReport {
    fn record(&mut self, outcome: &ItemOutcome) {
        if outcome.is_completed() {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
    }

    fn merge(&mut self, other: PoolReport) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.errors += other.errors;
    }
}

/// Pool of workers pulling from one queue.
pub struct WorkerPool {
    pipeline: Arc<Pipeline>,
    workers: usize,
    poll_interval: Duration,
    shutdown_timeout: Duration,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn new(config: &WorkerConfig, pipeline: Arc<Pipeline>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            pipeline,
            workers: config.max_concurrent_videos.max(1),
            poll_interval: config.poll_interval,
            shutdown_timeout: config.shutdown_timeout,
            shutdown,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process items until none are pending, then return.
    pub async fn run_until_idle(&self) -> PoolReport {
        info!(workers = self.workers, "Processing queue until idle");
        let mut tasks = self.spawn_workers(None);

        let mut report = PoolReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(worker_report) => report.merge(worker_report),
                Err(e) => error!(error = %e, "Worker task panicked"),
            }
        }

        info!(
            completed = report.completed,
            failed = report.failed,
            errors = report.errors,
            "Queue drained"
        );
        report
    }

    /// Process items, polling for new work, until [`shutdown`](Self::shutdown)
    /// is called. In-flight items get up to the shutdown timeout to finish.
    pub async fn run(&self) -> PoolReport {
        info!(
            workers = self.workers,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Starting worker pool"
        );
        let mut tasks = self.spawn_workers(Some(self.poll_interval));

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut report = PoolReport::default();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping workers");
                        break;
                    }
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok(worker_report)) => report.merge(worker_report),
                    Some(Err(e)) => error!(error = %e, "Worker task panicked"),
                    None => break,
                },
            }
        }

        info!("Waiting for in-flight items to complete...");
        let drain = async {
            while let Some(joined) = tasks.join_next().await {
                if let Ok(worker_report) = joined {
                    report.merge(worker_report);
                }
            }
        };
        if tokio::time::timeout(self.shutdown_timeout, drain).await.is_err() {
            warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                "In-flight items did not finish in time, aborting"
            );
            tasks.abort_all();
        }

        info!(
            completed = report.completed,
            failed = report.failed,
            "Worker pool stopped"
        );
        report
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    fn spawn_workers(&self, poll_interval: Option<Duration>) -> JoinSet<PoolReport> {
        let mut tasks = JoinSet::new();
        for worker in 0..self.workers {
            let pipeline = Arc::clone(&self.pipeline);
            let shutdown = self.shutdown.subscribe();
            tasks.spawn(worker_loop(worker, pipeline, shutdown, poll_interval));
        }
        tasks
    }
}

/// Claim and process items one at a time.
///
/// With no `poll_interval` the loop ends as soon as the queue has nothing
/// pending; otherwise it waits and polls again until shutdown.
async fn worker_loop(
    worker: usize,
    pipeline: Arc<Pipeline>,
    mut shutdown: watch::Receiver<bool>,
    poll_interval: Option<Duration>,
) -> PoolReport {
    let mut report = PoolReport::default();
    let mut failures = FailureTracker::new(3);

    loop {
        if *shutdown.borrow() {
            break;
        }

        match pipeline.run_next().await {
            Ok(Some(outcome)) => {
                failures.record_success();
                debug!(worker, item_id = %outcome.id(), completed = outcome.is_completed(), "Item finished");
                report.record(&outcome);
                continue;
            }
            Ok(None) => {
                failures.record_success();
            }
            Err(e) => {
                report.errors += 1;
                if failures.record_failure() {
                    error!(worker, error = %e, "Failed to run next item");
                }
            }
        }

        let Some(interval) = poll_interval else {
            break;
        };
        tokio::select! {
            _ = shutdown.changed() => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }

    debug!(worker, "Worker stopped");
    report
}
