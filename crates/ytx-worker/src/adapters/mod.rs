//! Concrete collaborators for the pipeline: yt-dlp transcripts, Gemini
//! analysis and markdown output.

pub mod gemini;
pub mod markdown;
pub mod transcript;

pub use gemini::{GeminiDeriver, ANALYSIS_PROMPT};
pub use markdown::MarkdownRenderer;
pub use transcript::YtDlpSource;
