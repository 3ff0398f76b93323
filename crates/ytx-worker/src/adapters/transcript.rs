//! yt-dlp backed transcript source.
//!
//! Metadata comes from `yt-dlp --dump-json`; captions are downloaded as VTT
//! (manual subtitles preferred, auto-generated accepted) and parsed into
//! timed lines.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};
use ytx_models::{extract_youtube_id, RawContent, TranscriptLine, VideoMeta};

use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::TranscriptSource;

/// Fetches metadata and captions by shelling out to yt-dlp.
pub struct YtDlpSource {
    work_dir: PathBuf,
    timeout: Duration,
    binary: String,
}

/// Subset of `yt-dlp --dump-json` output.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    upload_date: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    webpage_url: Option<String>,
}

impl YtDlpSource {
    pub fn new(work_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            work_dir: work_dir.into(),
            timeout,
            binary: "yt-dlp".to_string(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn run(&self, args: &[&str]) -> WorkerResult<Output> {
        let command = tokio::process::Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, command).await {
            Ok(result) => result
                .map_err(|e| WorkerError::fetch(format!("Failed to run {}: {}", self.binary, e)))?,
            Err(_) => {
                return Err(WorkerError::fetch(format!(
                    "{} timed out after {}s",
                    self.binary,
                    self.timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkerError::fetch(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }

    async fn fetch_metadata(&self, url: &str) -> WorkerResult<VideoMeta> {
        let output = self
            .run(&["--dump-json", "--skip-download", "--no-playlist", url])
            .await?;
        let info: YtDlpInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| WorkerError::fetch(format!("Unexpected yt-dlp metadata output: {}", e)))?;
        Ok(info.into_meta(url))
    }

    async fn fetch_captions(&self, url: &str, dir: &Path) -> WorkerResult<Vec<TranscriptLine>> {
        let template = dir.join("%(id)s");
        let template = template.to_string_lossy();
        self.run(&[
            "--write-sub",
            "--write-auto-sub",
            "--sub-lang",
            "en.*,en",
            "--sub-format",
            "vtt",
            "--skip-download",
            "--no-playlist",
            "--output",
            &template,
            url,
        ])
        .await?;

        let mut vtt_files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("vtt") {
                vtt_files.push(path);
            }
        }
        if vtt_files.is_empty() {
            return Err(WorkerError::fetch(
                "No captions available for this video",
            ));
        }

        // Plain ".en.vtt" first, then regional English, then anything.
        vtt_files.sort_by_key(|path| {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            if name.ends_with(".en.vtt") {
                0
            } else if name.contains(".en") {
                1
            } else {
                2
            }
        });
        debug!(file = %vtt_files[0].display(), "Using caption file");

        let content = tokio::fs::read_to_string(&vtt_files[0]).await?;
        let lines = parse_vtt(&content)?;
        if lines.is_empty() {
            return Err(WorkerError::fetch("Caption file contained no text"));
        }
        Ok(lines)
    }
}

#[async_trait]
impl TranscriptSource for YtDlpSource {
    async fn fetch(&self, url: &str) -> WorkerResult<RawContent> {
        let video_id = extract_youtube_id(url)
            .map_err(|e| WorkerError::rejected(format!("{}: {}", e, url)))?;
        info!(video_id = %video_id, "Fetching transcript using yt-dlp");

        let meta = self.fetch_metadata(url).await?;

        let dir = self.work_dir.join(&video_id);
        tokio::fs::create_dir_all(&dir).await?;
        let captions = self.fetch_captions(url, &dir).await;
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            warn!(dir = %dir.display(), error = %e, "Failed to clean up caption directory");
        }

        Ok(RawContent {
            meta,
            transcript: captions?,
        })
    }
}

impl YtDlpInfo {
    fn into_meta(self, requested_url: &str) -> VideoMeta {
        VideoMeta {
            url: self.webpage_url.unwrap_or_else(|| requested_url.to_string()),
            video_id: self.id,
            title: self.title,
            channel: self.channel.or(self.uploader).unwrap_or_default(),
            duration_sec: self.duration.map(|d| d.max(0.0) as u64).unwrap_or(0),
            published_at: self.upload_date.map(|d| format_upload_date(&d)),
            language: self.language,
            tags: self.tags.unwrap_or_default(),
        }
    }
}

/// `20240131` -> `2024-01-31`; anything else is passed through.
fn format_upload_date(date: &str) -> String {
    if date.len() == 8 && date.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}-{}", &date[..4], &date[4..6], &date[6..])
    } else {
        date.to_string()
    }
}

/// Parse WebVTT into timed lines.
///
/// Inline tags are stripped, and the rolling duplicates that auto-generated
/// captions produce (each cue repeating the previous line) are dropped.
pub fn parse_vtt(content: &str) -> WorkerResult<Vec<TranscriptLine>> {
    let cue_pattern = Regex::new(
        r"^((?:\d+:)?\d{2}:\d{2}\.\d{3})\s+-->\s+((?:\d+:)?\d{2}:\d{2}\.\d{3})",
    )
    .map_err(|e| WorkerError::fetch(format!("Invalid cue pattern: {}", e)))?;
    let tag_pattern = Regex::new(r"<[^>]+>")
        .map_err(|e| WorkerError::fetch(format!("Invalid tag pattern: {}", e)))?;

    let mut lines: Vec<TranscriptLine> = Vec::new();
    let mut cue: Option<(f64, f64)> = None;
    let mut last_text = String::new();

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            cue = None;
            continue;
        }

        if let Some(caps) = cue_pattern.captures(line) {
            cue = match (parse_timestamp(&caps[1]), parse_timestamp(&caps[2])) {
                (Some(start), Some(end)) => Some((start, end)),
                _ => None,
            };
            continue;
        }

        let Some((start, end)) = cue else {
            // Header, NOTE blocks, cue identifiers.
            continue;
        };

        let text = tag_pattern.replace_all(line, "");
        let text = text.trim();
        if text.is_empty() || text == last_text {
            continue;
        }

        last_text = text.to_string();
        lines.push(TranscriptLine {
            start,
            duration: (end - start).max(0.0),
            text: last_text.clone(),
        });
    }

    Ok(lines)
}

/// `HH:MM:SS.mmm` or `MM:SS.mmm` to seconds.
fn parse_timestamp(ts: &str) -> Option<f64> {
    let mut secs = 0.0;
    for part in ts.split(':') {
        secs = secs * 60.0 + part.parse::<f64>().ok()?;
    }
    Some(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_VTT: &str = "WEBVTT
Kind: captions
Language: en

00:00:00.000 --> 00:00:02.500 align:start position:0%
Hello<00:00:01.000><c> and</c><c> welcome</c>

00:00:02.500 --> 00:00:04.000
Hello and welcome

2
00:01:05.250 --> 00:01:07.000
to the <b>show</b>
";

    #[test]
    fn test_parse_vtt() {
        let lines = parse_vtt(SAMPLE_VTT).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Hello and welcome");
        assert_eq!(lines[0].start, 0.0);
        assert!((lines[0].duration - 2.5).abs() < 1e-9);
        assert_eq!(lines[1].text, "to the show");
        assert!((lines[1].start - 65.25).abs() < 1e-9);
    }

    #[test]
    fn test_parse_vtt_without_cues() {
        assert!(parse_vtt("WEBVTT\n\nNOTE nothing here\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("01:02:03.500"), Some(3723.5));
        assert_eq!(parse_timestamp("02:03.000"), Some(123.0));
        assert_eq!(parse_timestamp("xx:03.000"), None);
    }

    #[test]
    fn test_info_into_meta() {
        let info: YtDlpInfo = serde_json::from_str(
            r#"{"id": "dQw4w9WgXcQ", "title": "T", "uploader": "U", "duration": 212.0,
                "upload_date": "20091025", "tags": ["music"]}"#,
        )
        .unwrap();
        let meta = info.into_meta("https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(meta.channel, "U");
        assert_eq!(meta.duration_sec, 212);
        assert_eq!(meta.published_at.as_deref(), Some("2009-10-25"));
        assert_eq!(meta.url, "https://youtu.be/dQw4w9WgXcQ");
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = YtDlpSource::new(dir.path(), Duration::from_secs(1));
        let err = source.fetch("https://example.com/watch").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_binary_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = YtDlpSource::new(dir.path(), Duration::from_secs(5))
            .with_binary("ytx-no-such-binary");
        let err = source
            .fetch("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Fetch(_)));
        assert!(!err.is_retryable());
    }
}
