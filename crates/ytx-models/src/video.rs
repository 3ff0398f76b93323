//! Video metadata and transcript models.

use serde::{Deserialize, Serialize};

/// Metadata for a single video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    /// YouTube video id (11 characters)
    pub video_id: String,
    /// Canonical watch URL
    pub url: String,
    pub title: String,
    /// Channel (owner) name
    pub channel: String,
    #[serde(default)]
    pub duration_sec: u64,
    /// ISO date or `YYYYMMDD` as reported by the source
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl VideoMeta {
    /// Format duration as `HH:MM:SS`, or `MM:SS` for videos under an hour.
    pub fn duration_formatted(&self) -> String {
        let hours = self.duration_sec / 3600;
        let minutes = (self.duration_sec % 3600) / 60;
        let seconds = self.duration_sec % 60;
        if hours > 0 {
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}", minutes, seconds)
        }
    }
}

/// A single transcript line with timing in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub start: f64,
    pub duration: f64,
    pub text: String,
}

impl TranscriptLine {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Output of the raw fetch step: metadata plus transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawContent {
    pub meta: VideoMeta,
    pub transcript: Vec<TranscriptLine>,
}

impl RawContent {
    /// Join transcript lines into one string, skipping blank lines.
    pub fn transcript_text(&self) -> String {
        self.transcript
            .iter()
            .map(|line| line.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(duration_sec: u64) -> VideoMeta {
        VideoMeta {
            video_id: "dQw4w9WgXcQ".into(),
            url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".into(),
            title: "Test".into(),
            channel: "Channel".into(),
            duration_sec,
            published_at: None,
            language: None,
            tags: vec![],
        }
    }

    #[test]
    fn test_duration_formatted() {
        assert_eq!(meta(59).duration_formatted(), "00:59");
        assert_eq!(meta(3725).duration_formatted(), "01:02:05");
    }

    #[test]
    fn test_transcript_text_skips_blank_lines() {
        let raw = RawContent {
            meta: meta(10),
            transcript: vec![
                TranscriptLine { start: 0.0, duration: 1.0, text: " hello ".into() },
                TranscriptLine { start: 1.0, duration: 1.0, text: "   ".into() },
                TranscriptLine { start: 2.0, duration: 1.5, text: "world".into() },
            ],
        };
        assert_eq!(raw.transcript_text(), "hello world");
        assert_eq!(raw.transcript[2].end(), 3.5);
    }

    #[test]
    fn test_meta_defaults_on_missing_fields() {
        let json = r#"{"video_id":"a","url":"u","title":"t","channel":"c"}"#;
        let meta: VideoMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.duration_sec, 0);
        assert!(meta.tags.is_empty());
    }
}
