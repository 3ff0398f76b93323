//! Persistent processing queue for the ytx pipeline.
//!
//! This crate provides:
//! - `QueueItem` and input validation
//! - `ProcessingQueue`: ordered, bounded, duplicate-suppressing queue with an
//!   atomic on-disk snapshot
//! - Exactly-once claiming through `next_pending`

pub mod config;
pub mod error;
pub mod item;
pub mod queue;
mod snapshot;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use item::{
    is_relative_label, sanitize_category, validate_url, QueueItem, ITEM_ID_LEN,
};
pub use queue::{EnqueueReport, ProcessingQueue, QueueStats, INTERRUPTED_ERROR};
