//! On-disk mirror of the queue.
//!
//! The whole queue is written as one JSON document
//! `{ "items": [...], "updated_at": "<RFC 3339>" }`. Writes go to
//! `queue.json.tmp` and are renamed over `queue.json`, so a crash leaves
//! either the previous snapshot or the new one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};
use crate::item::QueueItem;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    items: Vec<QueueItem>,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    items: &'a [QueueItem],
    updated_at: DateTime<Utc>,
}

/// Result of reading the snapshot at startup.
#[derive(Debug)]
pub(crate) enum LoadOutcome {
    /// No snapshot yet
    Missing,
    Loaded(Vec<QueueItem>),
    /// Unreadable snapshot, preserved at `preserved_at` when the move worked
    Corrupt {
        reason: String,
        preserved_at: Option<PathBuf>,
    },
}

pub(crate) struct SnapshotFile {
    path: PathBuf,
    retries: u32,
    retry_delay: Duration,
}

impl SnapshotFile {
    pub(crate) fn new(path: PathBuf, retries: u32, retry_delay: Duration) -> Self {
        Self {
            path,
            retries: retries.max(1),
            retry_delay,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn load(&self) -> QueueResult<LoadOutcome> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LoadOutcome::Missing),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Snapshot>(&data) {
            Ok(snapshot) => Ok(LoadOutcome::Loaded(snapshot.items)),
            Err(e) => {
                let reason = e.to_string();
                let preserved_at = self.preserve_corrupt().await;
                Ok(LoadOutcome::Corrupt {
                    reason,
                    preserved_at,
                })
            }
        }
    }

    /// Move the unreadable file aside so the next save does not overwrite it.
    async fn preserve_corrupt(&self) -> Option<PathBuf> {
        let target = sibling(&self.path, "corrupt");
        match tokio::fs::rename(&self.path, &target).await {
            Ok(()) => Some(target),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to preserve corrupt queue file"
                );
                None
            }
        }
    }

    /// Write the full snapshot, retrying with a linearly growing delay.
    pub(crate) async fn save(&self, items: &[QueueItem]) -> QueueResult<()> {
        let data = serde_json::to_vec_pretty(&SnapshotRef {
            items,
            updated_at: Utc::now(),
        })?;

        let mut last_error = String::new();
        for attempt in 0..self.retries {
            match self.write_once(&data).await {
                Ok(()) => {
                    debug!(items = items.len(), attempt = attempt + 1, "Queue saved");
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.retries,
                        path = %self.path.display(),
                        error = %e,
                        "Failed to save queue"
                    );
                    if attempt + 1 < self.retries {
                        tokio::time::sleep(self.retry_delay * (attempt + 1)).await;
                    }
                }
            }
        }

        Err(QueueError::persistence(format!(
            "{} (after {} attempts)",
            last_error, self.retries
        )))
    }

    async fn write_once(&self, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = sibling(&self.path, "tmp");
        if let Err(e) = tokio::fs::write(&tmp, data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }
}

/// `queue.json` -> `queue.json.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
