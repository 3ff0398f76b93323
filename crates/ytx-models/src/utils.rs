//! YouTube URL parsing and validation.

use thiserror::Error;

/// Errors that can occur during YouTube ID extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum YoutubeIdError {
    #[error("URL is not a valid YouTube URL")]
    InvalidYoutubeUrl,
    #[error("Video ID has invalid format")]
    InvalidVideoId,
    #[error("Video ID not found in URL")]
    VideoIdNotFound,
}

pub type YoutubeIdResult<T> = Result<T, YoutubeIdError>;

/// URL fragments after which the video id starts, in order of preference.
const ID_MARKERS: [&str; 6] = ["?v=", "&v=", "youtu.be/", "/embed/", "/v/", "/shorts/"];

/// Extract the 11-character video id from a YouTube URL.
///
/// Supports `watch?v=`, `youtu.be/`, `/embed/`, `/v/` and `/shorts/` forms,
/// with or without extra query parameters.
pub fn extract_youtube_id(url: &str) -> YoutubeIdResult<String> {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();
    if !(lower.contains("youtube.com") || lower.contains("youtu.be")) {
        return Err(YoutubeIdError::InvalidYoutubeUrl);
    }

    let segment = ID_MARKERS.iter().find_map(|marker| {
        // Markers are ASCII so byte offsets match between `lower` and `url`.
        let start = lower.find(marker)? + marker.len();
        let rest = &url[start..];
        let end = rest.find(['&', '#', '?', '/']).unwrap_or(rest.len());
        Some(rest[..end].trim())
    });

    match segment {
        Some(id) if id.is_empty() && url.ends_with('/') => Err(YoutubeIdError::VideoIdNotFound),
        Some(id) => validate_youtube_id(id),
        None => Err(YoutubeIdError::VideoIdNotFound),
    }
}

/// True if `url` is an http(s) YouTube URL that carries a valid video id.
pub fn is_youtube_video_url(url: &str) -> bool {
    let url = url.trim();
    (url.starts_with("https://") || url.starts_with("http://")) && extract_youtube_id(url).is_ok()
}

fn validate_youtube_id(id: &str) -> YoutubeIdResult<String> {
    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if id.len() != 11 || !valid_chars {
        return Err(YoutubeIdError::InvalidVideoId);
    }
    Ok(id.to_string())
}
