//! Shared data models for the ytx report pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Queue item status and identifiers
//! - Video metadata and transcripts (raw content)
//! - LLM analysis results (derived content)
//! - YouTube URL parsing

pub mod analysis;
pub mod status;
pub mod utils;
pub mod video;

// Re-export common types
pub use analysis::{Analysis, Framework, TimestampNote};
pub use status::{ItemId, QueueStatus, UnknownStatus};
pub use utils::{extract_youtube_id, is_youtube_video_url, YoutubeIdError, YoutubeIdResult};
pub use video::{RawContent, TranscriptLine, VideoMeta};
