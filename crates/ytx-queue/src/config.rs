//! Queue configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Directory holding `queue.json`
    pub queue_dir: PathBuf,
    /// Maximum number of items, in any status
    pub max_size: usize,
    /// Snapshot write attempts before a mutation fails
    pub save_retries: u32,
    /// Base delay between snapshot write attempts (grows linearly)
    pub save_retry_delay: Duration,
    /// Move items found in `processing` at load time to `failed`
    pub fail_interrupted_on_load: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_dir: PathBuf::from("outputs/.queue"),
            max_size: 1000,
            save_retries: 3,
            save_retry_delay: Duration::from_millis(100),
            fail_interrupted_on_load: true,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            queue_dir: std::env::var("QUEUE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("outputs/.queue")),
            max_size: std::env::var("QUEUE_MAX_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
            save_retries: std::env::var("QUEUE_SAVE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(3),
            ..Default::default()
        }
    }

    /// Default config rooted at `queue_dir`.
    pub fn at(queue_dir: impl Into<PathBuf>) -> Self {
        Self {
            queue_dir: queue_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn queue_file(&self) -> PathBuf {
        self.queue_dir.join("queue.json")
    }
}
