//! Queue item definition and input validation.

use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ytx_models::{extract_youtube_id, is_youtube_video_url, ItemId, QueueStatus};

use crate::error::{QueueError, QueueResult};

/// Number of hex characters in an item id.
///
/// 8 hex chars give 32 bits; collisions inside one queue are resolved at
/// enqueue time by re-salting (see [`QueueItem::fingerprint`]).
pub const ITEM_ID_LEN: usize = 8;

/// A single video waiting for, undergoing, or finished with processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Immutable after creation
    pub id: ItemId,
    /// Video URL (the primary input)
    pub url: String,
    /// Optional grouping label
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: QueueStatus,
    /// Filled lazily once metadata is fetched
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    /// Error text of the last failure, kept verbatim
    #[serde(default)]
    pub error: Option<String>,
    /// Reference to the rendered output
    #[serde(default)]
    pub output_path: Option<String>,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// Create a pending item stamped with the current time.
    pub fn new(url: impl Into<String>, category: Option<String>) -> Self {
        let url = url.into();
        let added_at = Utc::now();
        Self {
            id: Self::fingerprint(&url, added_at, 0),
            url,
            category,
            status: QueueStatus::Pending,
            title: None,
            channel: None,
            error: None,
            output_path: None,
            added_at,
            processed_at: None,
        }
    }

    /// Short digest of URL plus enqueue time. A non-zero `salt` produces an
    /// alternative id for the same pair when the first one is taken.
    pub fn fingerprint(url: &str, added_at: DateTime<Utc>, salt: u32) -> ItemId {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update(added_at.to_rfc3339().as_bytes());
        if salt > 0 {
            hasher.update(salt.to_le_bytes());
        }
        let hex = format!("{:x}", hasher.finalize());
        ItemId(hex[..ITEM_ID_LEN].to_string())
    }

    /// Pending or processing.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Title if known, otherwise the URL.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }

    /// Identity used for duplicate suppression: the video id when the URL
    /// has one, otherwise the trimmed URL.
    pub fn input_identity(&self) -> String {
        input_identity(&self.url)
    }
}

pub(crate) fn input_identity(url: &str) -> String {
    extract_youtube_id(url).unwrap_or_else(|_| url.trim().to_string())
}

/// Trim and validate a video URL.
pub fn validate_url(url: &str) -> QueueResult<String> {
    let url = url.trim();
    if !is_youtube_video_url(url) {
        return Err(QueueError::invalid_input(format!("Invalid YouTube URL: {}", url)));
    }
    Ok(url.to_string())
}

/// Trim a category label; empty becomes `None`.
///
/// Labels end up as directory names under the output directory, so only
/// relative paths made of plain components are accepted: no root, no `.`
/// or `..`, no backslashes or NUL.
pub fn sanitize_category(category: Option<&str>) -> QueueResult<Option<String>> {
    let Some(category) = category.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    if !is_relative_label(category) {
        return Err(QueueError::invalid_input(format!(
            "Invalid category: {}",
            category.escape_debug()
        )));
    }
    Ok(Some(category.to_string()))
}

/// True if `label` is a relative path of plain components that cannot
/// leave the directory it is joined onto.
pub fn is_relative_label(label: &str) -> bool {
    if label.is_empty() || label.contains('\\') || label.contains('\0') {
        return false;
    }
    Path::new(label)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    #[test]
    fn test_new_item_defaults() {
        let item = QueueItem::new(URL, Some("talks".into()));
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.id.as_str().len(), ITEM_ID_LEN);
        assert!(item.id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(item.is_active());
        assert_eq!(item.display_name(), URL);
    }

    #[test]
    fn test_fingerprint_is_deterministic_and_salted() {
        let at = Utc::now();
        let a = QueueItem::fingerprint(URL, at, 0);
        assert_eq!(a, QueueItem::fingerprint(URL, at, 0));
        assert_ne!(a, QueueItem::fingerprint(URL, at, 1));
        assert_ne!(a, QueueItem::fingerprint(URL, at + chrono::Duration::milliseconds(1), 0));
    }

    #[test]
    fn test_input_identity_ignores_url_spelling() {
        let a = QueueItem::new(URL, None);
        let b = QueueItem::new("https://youtu.be/dQw4w9WgXcQ?t=4", None);
        assert_eq!(a.input_identity(), b.input_identity());
    }

    #[test]
    fn test_validate_url() {
        assert_eq!(validate_url(&format!("  {}  ", URL)).unwrap(), URL);
        assert!(validate_url("https://vimeo.com/1").is_err());
        assert!(validate_url("").is_err());
    }

    #[test]
    fn test_sanitize_category() {
        assert_eq!(sanitize_category(None).unwrap(), None);
        assert_eq!(sanitize_category(Some("   ")).unwrap(), None);
        assert_eq!(sanitize_category(Some(" AI ")).unwrap(), Some("AI".to_string()));
        assert!(sanitize_category(Some("../etc")).is_err());
        assert!(sanitize_category(Some("a\\b")).is_err());
        assert!(sanitize_category(Some("a\0b")).is_err());
        assert!(sanitize_category(Some("/tmp/x")).is_err());
        assert!(sanitize_category(Some("talks/../..")).is_err());
        assert!(sanitize_category(Some("./talks")).is_err());
        assert_eq!(
            sanitize_category(Some("talks/ai")).unwrap(),
            Some("talks/ai".to_string())
        );
    }

    #[test]
    fn test_item_serde_fills_missing_optionals() {
        let json = format!(
            r#"{{"id":"abcd1234","url":"{}","added_at":"2025-01-01T00:00:00Z"}}"#,
            URL
        );
        let item: QueueItem = serde_json::from_str(&json).unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert!(item.processed_at.is_none());
    }
}
