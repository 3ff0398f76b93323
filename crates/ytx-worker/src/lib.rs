//! Video-to-notes pipeline worker.
//!
//! This crate provides:
//! - Retry policy with transient / rate-limited / fatal classification
//! - Pipeline orchestration over the queue and content cache
//! - Bounded worker pool with graceful shutdown
//! - yt-dlp, Gemini and markdown collaborators

pub mod adapters;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod retry;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{PoolReport, WorkerPool};
pub use logging::ItemLogger;
pub use pipeline::{Deriver, ItemOutcome, Pipeline, Renderer, TranscriptSource};
pub use retry::{
    classify_message, AttemptError, FailureClass, FailureTracker, RetryContext, RetryError,
    RetryPolicy,
};
