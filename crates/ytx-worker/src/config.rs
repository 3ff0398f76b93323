//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on concurrent workers.
pub const MAX_WORKERS: usize = 8;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum items processed concurrently (1..=8)
    pub max_concurrent_videos: usize,
    /// Model used for derivation; part of every derived cache key
    pub llm_model: String,
    /// Root directory for rendered notes
    pub output_dir: PathBuf,
    /// Work directory for temporary files
    pub work_dir: PathBuf,
    /// Per-attempt timeout for remote calls
    pub attempt_timeout: Duration,
    /// How long an idle worker waits before polling the queue again
    pub poll_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Prometheus listen address; metrics are off when unset
    pub metrics_addr: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_videos: 3,
            llm_model: "gemini-2.5-flash".to_string(),
            output_dir: PathBuf::from("./notes"),
            work_dir: PathBuf::from("/tmp/ytx"),
            attempt_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(1000),
            shutdown_timeout: Duration::from_secs(30),
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_videos: std::env::var("MAX_CONCURRENT_VIDEOS")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(3)
                .clamp(1, MAX_WORKERS),
            llm_model: std::env::var("LLM_MODEL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            output_dir: std::env::var("DEFAULT_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./notes")),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/ytx")),
            attempt_timeout: Duration::from_secs(
                std::env::var("WORKER_ATTEMPT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            poll_interval: Duration::from_millis(
                std::env::var("WORKER_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            metrics_addr: std::env::var("METRICS_ADDR")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn with_max_concurrent_videos(mut self, n: usize) -> Self {
        self.max_concurrent_videos = n.clamp(1, MAX_WORKERS);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count_is_clamped() {
        assert_eq!(WorkerConfig::default().with_max_concurrent_videos(0).max_concurrent_videos, 1);
        assert_eq!(WorkerConfig::default().with_max_concurrent_videos(64).max_concurrent_videos, MAX_WORKERS);
        assert_eq!(WorkerConfig::default().with_max_concurrent_videos(4).max_concurrent_videos, 4);
    }
}
