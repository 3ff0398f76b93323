//! Persistent processing queue.
//!
//! All mutations go through one `tokio::sync::Mutex`: the change is applied
//! to a working copy, the full snapshot is written, and only then does the
//! in-memory list take the new state. A failed write leaves memory and disk
//! agreeing on the previous state.
//!
//! Workers must claim work with [`ProcessingQueue::next_pending`]. Iterating a
//! [`ProcessingQueue::list`] snapshot of pending items and processing them is
//! racy: another caller may claim, remove or reorder items in the meantime.

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ytx_models::{ItemId, QueueStatus};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::item::{input_identity, sanitize_category, validate_url, QueueItem};
use crate::snapshot::{LoadOutcome, SnapshotFile};

/// Error text recorded on items found mid-processing at startup.
pub const INTERRUPTED_ERROR: &str = "interrupted before completion";

/// Item counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueStats {
    pub fn count(&self, status: QueueStatus) -> usize {
        match status {
            QueueStatus::Pending => self.pending,
            QueueStatus::Processing => self.processing,
            QueueStatus::Completed => self.completed,
            QueueStatus::Failed => self.failed,
        }
    }
}

/// Outcome of a batch enqueue. Partial success is normal.
#[derive(Debug, Clone, Default)]
pub struct EnqueueReport {
    pub added: Vec<QueueItem>,
    /// Inputs already pending or processing (including repeats in the batch)
    pub skipped_duplicates: usize,
    /// `(input, reason)` for inputs that failed validation
    pub invalid: Vec<(String, String)>,
    /// The batch stopped early because the queue reached its bound
    pub capacity_reached: bool,
}

/// Durable, reorderable, concurrency-safe work queue.
pub struct ProcessingQueue {
    config: QueueConfig,
    snapshot: SnapshotFile,
    items: Mutex<Vec<QueueItem>>,
    load_warning: Option<String>,
}

impl ProcessingQueue {
    /// Open the queue, loading the persisted snapshot if there is one.
    ///
    /// A corrupt snapshot never fails startup: the queue starts empty and
    /// the reason is available through [`load_warning`](Self::load_warning).
    pub async fn open(config: QueueConfig) -> QueueResult<Self> {
        let snapshot = SnapshotFile::new(
            config.queue_file(),
            config.save_retries,
            config.save_retry_delay,
        );

        let mut load_warning = None;
        let mut items = match snapshot.load().await? {
            LoadOutcome::Missing => Vec::new(),
            LoadOutcome::Loaded(items) => items,
            LoadOutcome::Corrupt {
                reason,
                preserved_at,
            } => {
                let message = match preserved_at {
                    Some(path) => format!(
                        "Queue file was unreadable ({}); starting empty, old file kept at {}",
                        reason,
                        path.display()
                    ),
                    None => format!("Queue file was unreadable ({}); starting empty", reason),
                };
                warn!(path = %snapshot.path().display(), "{}", message);
                load_warning = Some(message);
                Vec::new()
            }
        };

        if config.fail_interrupted_on_load {
            let now = Utc::now();
            let mut interrupted = 0;
            for item in items
                .iter_mut()
                .filter(|i| i.status == QueueStatus::Processing)
            {
                item.status = QueueStatus::Failed;
                item.error = Some(INTERRUPTED_ERROR.to_string());
                item.processed_at = Some(now);
                interrupted += 1;
            }
            if interrupted > 0 {
                warn!(count = interrupted, "Marked interrupted items as failed");
                snapshot.save(&items).await?;
            }
        }

        info!(
            path = %snapshot.path().display(),
            items = items.len(),
            max_size = config.max_size,
            "Queue opened"
        );

        Ok(Self {
            config,
            snapshot,
            items: Mutex::new(items),
            load_warning,
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Warning recorded while loading a corrupt snapshot.
    pub fn load_warning(&self) -> Option<&str> {
        self.load_warning.as_deref()
    }

    /// Apply `f` to a working copy; persist and commit only if it changed.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Vec<QueueItem>) -> QueueResult<T>,
    ) -> QueueResult<T> {
        let mut items = self.items.lock().await;
        let mut working = items.clone();
        let out = f(&mut working)?;
        if working != *items {
            self.snapshot.save(&working).await?;
            *items = working;
        }
        Ok(out)
    }

    /// Add one input at the back of the queue.
    pub async fn enqueue(&self, url: &str, category: Option<&str>) -> QueueResult<QueueItem> {
        let url = validate_url(url)?;
        let category = sanitize_category(category)?;
        let max_size = self.config.max_size;

        let item = self
            .mutate(|items| {
                check_not_active(items, &url, None)?;
                if items.len() >= max_size {
                    return Err(QueueError::capacity(max_size));
                }
                let item = unique_item(items, url.clone(), category);
                items.push(item.clone());
                Ok(item)
            })
            .await?;

        info!(item_id = %item.id, url = %item.url, "Item enqueued");
        Ok(item)
    }

    /// Add many inputs in order with a single snapshot write.
    ///
    /// Blank lines and `#` comments are ignored. Duplicates and invalid
    /// inputs are reported, not fatal; the batch stops at the size bound.
    pub async fn enqueue_many<I, S>(
        &self,
        urls: I,
        category: Option<&str>,
    ) -> QueueResult<EnqueueReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let category = sanitize_category(category)?;
        let max_size = self.config.max_size;
        let inputs: Vec<String> = urls
            .into_iter()
            .map(|u| u.as_ref().trim().to_string())
            .filter(|u| !u.is_empty() && !u.starts_with('#'))
            .collect();

        let report = self
            .mutate(|items| {
                let mut report = EnqueueReport::default();
                for input in inputs {
                    let url = match validate_url(&input) {
                        Ok(url) => url,
                        Err(e) => {
                            report.invalid.push((input, e.to_string()));
                            continue;
                        }
                    };
                    if check_not_active(items, &url, None).is_err() {
                        report.skipped_duplicates += 1;
                        continue;
                    }
                    if items.len() >= max_size {
                        report.capacity_reached = true;
                        break;
                    }
                    let item = unique_item(items, url, category.clone());
                    items.push(item.clone());
                    report.added.push(item);
                }
                Ok(report)
            })
            .await?;

        info!(
            added = report.added.len(),
            skipped_duplicates = report.skipped_duplicates,
            invalid = report.invalid.len(),
            capacity_reached = report.capacity_reached,
            "Batch enqueued"
        );
        Ok(report)
    }

    /// Claim the earliest pending item, marking it processing.
    ///
    /// This is the only safe way to take work from a shared queue: each
    /// pending item is handed to exactly one caller.
    pub async fn next_pending(&self) -> QueueResult<Option<QueueItem>> {
        let claimed = self
            .mutate(|items| {
                Ok(items
                    .iter_mut()
                    .find(|i| i.status == QueueStatus::Pending)
                    .map(|item| {
                        item.status = QueueStatus::Processing;
                        item.clone()
                    }))
            })
            .await?;

        if let Some(item) = &claimed {
            debug!(item_id = %item.id, url = %item.url, "Item claimed");
        }
        Ok(claimed)
    }

    /// Move an item to `status`, recording its output reference or error.
    ///
    /// Entering a terminal status stamps `processed_at`. Re-entering
    /// `pending` from `failed` clears the previous error and timestamp and
    /// fails with `Duplicate` if another active item has the same input.
    /// Terminal items never accept their own status again, so a finished
    /// item's output, error and timestamp stay as first recorded.
    pub async fn set_status(
        &self,
        id: &ItemId,
        status: QueueStatus,
        output_path: Option<String>,
        error: Option<String>,
    ) -> QueueResult<QueueItem> {
        let item = self
            .mutate(|items| {
                let index = position(items, id)?;
                let current = items[index].status;
                let allowed = current.can_transition_to(status)
                    || (current == status && !status.is_terminal());
                if !allowed {
                    return Err(QueueError::InvalidTransition {
                        id: id.clone(),
                        from: current,
                        to: status,
                    });
                }
                if status == QueueStatus::Pending && current != QueueStatus::Pending {
                    let url = items[index].url.clone();
                    check_not_active(items, &url, Some(id))?;
                }

                let item = &mut items[index];
                item.status = status;
                match status {
                    QueueStatus::Completed => {
                        item.processed_at = Some(Utc::now());
                        item.error = None;
                        if output_path.is_some() {
                            item.output_path = output_path;
                        }
                    }
                    QueueStatus::Failed => {
                        item.processed_at = Some(Utc::now());
                        item.error = error;
                    }
                    QueueStatus::Pending => {
                        item.processed_at = None;
                        item.error = None;
                    }
                    QueueStatus::Processing => {}
                }
                Ok(item.clone())
            })
            .await?;

        debug!(item_id = %id, status = %status, "Item status updated");
        Ok(item)
    }

    /// Mark a claimed item completed.
    pub async fn complete(&self, id: &ItemId, output_path: impl Into<String>) -> QueueResult<QueueItem> {
        self.set_status(id, QueueStatus::Completed, Some(output_path.into()), None)
            .await
    }

    /// Mark a claimed item failed, keeping the error text verbatim.
    pub async fn fail(&self, id: &ItemId, error: impl Into<String>) -> QueueResult<QueueItem> {
        self.set_status(id, QueueStatus::Failed, None, Some(error.into()))
            .await
    }

    /// Fill in human-readable metadata. `None` leaves a field unchanged.
    pub async fn update_metadata(
        &self,
        id: &ItemId,
        title: Option<String>,
        channel: Option<String>,
    ) -> QueueResult<()> {
        self.mutate(|items| {
            let index = position(items, id)?;
            let item = &mut items[index];
            if title.is_some() {
                item.title = title;
            }
            if channel.is_some() {
                item.channel = channel;
            }
            Ok(())
        })
        .await
    }

    /// Put one failed item back to pending.
    pub async fn retry_failed(&self, id: &ItemId) -> QueueResult<QueueItem> {
        let item = self.set_status(id, QueueStatus::Pending, None, None).await?;
        info!(item_id = %id, "Failed item reset to pending");
        Ok(item)
    }

    /// Put every failed item back to pending, in queue order.
    ///
    /// Items whose input is already active again are left failed. Returns
    /// the number of items reset.
    pub async fn retry_all_failed(&self) -> QueueResult<usize> {
        let reset = self
            .mutate(|items| {
                let mut reset = 0;
                for index in 0..items.len() {
                    if items[index].status != QueueStatus::Failed {
                        continue;
                    }
                    let id = items[index].id.clone();
                    let url = items[index].url.clone();
                    if check_not_active(items, &url, Some(&id)).is_err() {
                        debug!(item_id = %id, "Skipping retry, input already active");
                        continue;
                    }
                    let item = &mut items[index];
                    item.status = QueueStatus::Pending;
                    item.error = None;
                    item.processed_at = None;
                    reset += 1;
                }
                Ok(reset)
            })
            .await?;

        info!(count = reset, "Failed items reset to pending");
        Ok(reset)
    }

    /// Swap with the previous item. Returns `false` if already first.
    pub async fn move_earlier(&self, id: &ItemId) -> QueueResult<bool> {
        self.mutate(|items| {
            let index = position(items, id)?;
            if index == 0 {
                return Ok(false);
            }
            items.swap(index, index - 1);
            Ok(true)
        })
        .await
    }

    /// Swap with the next item. Returns `false` if already last.
    pub async fn move_later(&self, id: &ItemId) -> QueueResult<bool> {
        self.mutate(|items| {
            let index = position(items, id)?;
            if index + 1 >= items.len() {
                return Ok(false);
            }
            items.swap(index, index + 1);
            Ok(true)
        })
        .await
    }

    /// Remove an item. Returns `false` if it was not present.
    pub async fn remove(&self, id: &ItemId) -> QueueResult<bool> {
        let removed = self
            .mutate(|items| {
                let before = items.len();
                items.retain(|i| &i.id != id);
                Ok(items.len() != before)
            })
            .await?;

        if removed {
            info!(item_id = %id, "Item removed");
        }
        Ok(removed)
    }

    /// Remove all items, or only those in `status`. Returns how many went.
    pub async fn clear(&self, status: Option<QueueStatus>) -> QueueResult<usize> {
        let removed = self
            .mutate(|items| {
                let before = items.len();
                items.retain(|i| status.is_some_and(|s| i.status != s));
                Ok(before - items.len())
            })
            .await?;

        info!(
            count = removed,
            status = status.map(|s| s.as_str()).unwrap_or("all"),
            "Queue cleared"
        );
        Ok(removed)
    }

    /// Copy of the items in queue order, optionally filtered by status.
    ///
    /// The copy does not track later changes; claim work through
    /// [`next_pending`](Self::next_pending), not by iterating this.
    pub async fn list(&self, status: Option<QueueStatus>) -> Vec<QueueItem> {
        self.items
            .lock()
            .await
            .iter()
            .filter(|i| status.map_or(true, |s| i.status == s))
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &ItemId) -> Option<QueueItem> {
        self.items.lock().await.iter().find(|i| &i.id == id).cloned()
    }

    pub async fn stats(&self) -> QueueStats {
        let items = self.items.lock().await;
        let mut stats = QueueStats {
            total: items.len(),
            ..Default::default()
        };
        for item in items.iter() {
            match item.status {
                QueueStatus::Pending => stats.pending += 1,
                QueueStatus::Processing => stats.processing += 1,
                QueueStatus::Completed => stats.completed += 1,
                QueueStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

fn position(items: &[QueueItem], id: &ItemId) -> QueueResult<usize> {
    items
        .iter()
        .position(|i| &i.id == id)
        .ok_or_else(|| QueueError::not_found(id))
}

/// Fails with `Duplicate` if an active item other than `except` has the same
/// input as `url`.
fn check_not_active(items: &[QueueItem], url: &str, except: Option<&ItemId>) -> QueueResult<()> {
    let identity = input_identity(url);
    let clash = items.iter().any(|i| {
        i.is_active() && Some(&i.id) != except && i.input_identity() == identity
    });
    if clash {
        return Err(QueueError::duplicate(url));
    }
    Ok(())
}

/// New item whose id does not collide with any existing one.
fn unique_item(items: &[QueueItem], url: String, category: Option<String>) -> QueueItem {
    let mut item = QueueItem::new(url, category);
    let mut salt = 0;
    while items.iter().any(|i| i.id == item.id) {
        salt += 1;
        item.id = QueueItem::fingerprint(&item.url, item.added_at, salt);
    }
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn url(n: usize) -> String {
        format!("https://www.youtube.com/watch?v=vid{:08}", n)
    }

    async fn open_queue(dir: &TempDir) -> ProcessingQueue {
        ProcessingQueue::open(QueueConfig::at(dir.path())).await.unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_and_claim_in_order() {
        let dir = TempDir::new().unwrap();
        let queue = open_queue(&dir).await;

        let first = queue.enqueue(&url(1), None).await.unwrap();
        let second = queue.enqueue(&url(2), Some("talks")).await.unwrap();
        assert_eq!(second.category.as_deref(), Some("talks"));

        let claimed = queue.next_pending().await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, QueueStatus::Processing);
        assert_eq!(queue.next_pending().await.unwrap().unwrap().id, second.id);
        assert!(queue.next_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_while_active() {
        let dir = TempDir::new().unwrap();
        let queue = open_queue(&dir).await;

        queue.enqueue(&url(1), None).await.unwrap();
        let err = queue
            .enqueue("https://youtu.be/vid00000001", None)
            .await
            .unwrap_err();
        assert!(err.is_duplicate());

        // Still a duplicate while processing.
        queue.next_pending().await.unwrap();
        assert!(queue.enqueue(&url(1), None).await.unwrap_err().is_duplicate());
        assert_eq!(queue.stats().await.total, 1);
    }

    #[tokio::test]
    async fn test_terminal_items_may_be_added_again() {
        let dir = TempDir::new().unwrap();
        let queue = open_queue(&dir).await;

        queue.enqueue(&url(1), None).await.unwrap();
        let item = queue.next_pending().await.unwrap().unwrap();
        queue.complete(&item.id, "notes/a.md").await.unwrap();
        queue.enqueue(&url(1), None).await.unwrap();

        queue.enqueue(&url(2), None).await.unwrap();
        let item = queue.next_pending().await.unwrap().unwrap();
        queue.fail(&item.id, "boom").await.unwrap();
        queue.enqueue(&url(2), None).await.unwrap();

        assert_eq!(queue.stats().await.total, 4);
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let dir = TempDir::new().unwrap();
        let queue = open_queue(&dir).await;

        let err = queue.enqueue("https://example.com/video", None).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidInput(_)));
        let err = queue.enqueue(&url(1), Some("../up")).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidInput(_)));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_capacity_bound() {
        let dir = TempDir::new().unwrap();
        let queue = ProcessingQueue::open(QueueConfig::at(dir.path()).with_max_size(2))
            .await
            .unwrap();

        queue.enqueue(&url(1), None).await.unwrap();
        queue.enqueue(&url(2), None).await.unwrap();
        let err = queue.enqueue(&url(3), None).await.unwrap_err();
        assert!(err.is_capacity());
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn test_enqueue_many_reports_partial_success() {
        let dir = TempDir::new().unwrap();
        let queue = ProcessingQueue::open(QueueConfig::at(dir.path()).with_max_size(3))
            .await
            .unwrap();
        queue.enqueue(&url(1), None).await.unwrap();

        let lines = vec![
            "# watch later".to_string(),
            String::new(),
            url(1),
            url(2),
            "not a url".to_string(),
            url(2),
            url(3),
            url(4),
        ];
        let report = queue.enqueue_many(&lines, Some("batch")).await.unwrap();

        assert_eq!(report.added.len(), 2);
        assert_eq!(report.skipped_duplicates, 2);
        assert_eq!(report.invalid.len(), 1);
        assert_eq!(report.invalid[0].0, "not a url");
        assert!(report.capacity_reached);
        assert_eq!(queue.len().await, 3);
        assert!(report.added.iter().all(|i| i.category.as_deref() == Some("batch")));
    }

    #[tokio::test]
    async fn test_concurrent_claims_are_exclusive() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(open_queue(&dir).await);
        for n in 0..10 {
            queue.enqueue(&url(n), None).await.unwrap();
        }

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.next_pending().await.unwrap() })
            })
            .collect();
        let claimed: Vec<QueueItem> = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter_map(|r| r.unwrap())
            .collect();

        assert_eq!(claimed.len(), 10);
        let unique: HashSet<_> = claimed.iter().map(|i| i.id.clone()).collect();
        assert_eq!(unique.len(), 10);
        assert_eq!(queue.stats().await.processing, 10);
    }

    #[tokio::test]
    async fn test_completed_is_final() {
        let dir = TempDir::new().unwrap();
        let queue = open_queue(&dir).await;

        let item = queue.enqueue(&url(1), None).await.unwrap();
        let err = queue.complete(&item.id, "early").await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition { .. }));

        queue.next_pending().await.unwrap();
        let done = queue.complete(&item.id, "notes/x.md").await.unwrap();
        assert!(done.processed_at.is_some());
        assert_eq!(done.output_path.as_deref(), Some("notes/x.md"));

        for status in [QueueStatus::Pending, QueueStatus::Processing, QueueStatus::Failed] {
            assert!(queue.set_status(&item.id, status, None, None).await.is_err());
        }
        assert!(queue.retry_failed(&item.id).await.is_err());

        let err = queue.complete(&item.id, "notes/other.md").await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition { .. }));
        assert_eq!(queue.get(&item.id).await.unwrap(), done);
    }

    #[tokio::test]
    async fn test_failed_error_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let queue = open_queue(&dir).await;

        let item = queue.enqueue(&url(1), None).await.unwrap();
        queue.next_pending().await.unwrap();
        let failed = queue.fail(&item.id, "HTTP 403: forbidden").await.unwrap();

        let err = queue.fail(&item.id, "something else").await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition { .. }));
        assert_eq!(queue.get(&item.id).await.unwrap(), failed);
    }

    #[tokio::test]
    async fn test_retry_failed_clears_error() {
        let dir = TempDir::new().unwrap();
        let queue = open_queue(&dir).await;

        let item = queue.enqueue(&url(1), None).await.unwrap();
        queue.next_pending().await.unwrap();
        let failed = queue.fail(&item.id, "HTTP 400: bad request").await.unwrap();
        assert_eq!(failed.error.as_deref(), Some("HTTP 400: bad request"));

        let reset = queue.retry_failed(&item.id).await.unwrap();
        assert_eq!(reset.status, QueueStatus::Pending);
        assert!(reset.error.is_none());
        assert!(reset.processed_at.is_none());
    }

    #[tokio::test]
    async fn test_retry_rejected_when_input_active_again() {
        let dir = TempDir::new().unwrap();
        let queue = open_queue(&dir).await;

        let item = queue.enqueue(&url(1), None).await.unwrap();
        queue.next_pending().await.unwrap();
        queue.fail(&item.id, "boom").await.unwrap();
        queue.enqueue(&url(1), None).await.unwrap();

        assert!(queue.retry_failed(&item.id).await.unwrap_err().is_duplicate());
        assert_eq!(queue.retry_all_failed().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retry_all_failed() {
        let dir = TempDir::new().unwrap();
        let queue = open_queue(&dir).await;
        for n in 0..3 {
            queue.enqueue(&url(n), None).await.unwrap();
            let item = queue.next_pending().await.unwrap().unwrap();
            queue.fail(&item.id, "boom").await.unwrap();
        }

        assert_eq!(queue.retry_all_failed().await.unwrap(), 3);
        assert_eq!(queue.stats().await.pending, 3);
    }

    #[tokio::test]
    async fn test_reorder() {
        let dir = TempDir::new().unwrap();
        let queue = open_queue(&dir).await;
        let a = queue.enqueue(&url(1), None).await.unwrap();
        let b = queue.enqueue(&url(2), None).await.unwrap();
        let c = queue.enqueue(&url(3), None).await.unwrap();

        assert!(!queue.move_earlier(&a.id).await.unwrap());
        assert!(!queue.move_later(&c.id).await.unwrap());
        assert!(queue.move_earlier(&c.id).await.unwrap());

        let order: Vec<_> = queue.list(None).await.into_iter().map(|i| i.id).collect();
        assert_eq!(order, vec![a.id.clone(), c.id.clone(), b.id.clone()]);

        assert!(queue.move_later(&a.id).await.unwrap());
        assert_eq!(queue.next_pending().await.unwrap().unwrap().id, c.id);

        let missing = ItemId::from("ffffffff");
        assert!(matches!(
            queue.move_earlier(&missing).await.unwrap_err(),
            QueueError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let queue = open_queue(&dir).await;
        let a = queue.enqueue(&url(1), None).await.unwrap();
        queue.enqueue(&url(2), None).await.unwrap();
        queue.enqueue(&url(3), None).await.unwrap();
        let claimed = queue.next_pending().await.unwrap().unwrap();
        queue.complete(&claimed.id, "out.md").await.unwrap();

        assert_eq!(claimed.id, a.id);
        assert!(queue.remove(&a.id).await.unwrap());
        assert!(!queue.remove(&a.id).await.unwrap());
        assert_eq!(queue.clear(Some(QueueStatus::Failed)).await.unwrap(), 0);
        assert_eq!(queue.clear(Some(QueueStatus::Pending)).await.unwrap(), 2);
        assert_eq!(queue.clear(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_is_a_copy() {
        let dir = TempDir::new().unwrap();
        let queue = open_queue(&dir).await;
        queue.enqueue(&url(1), None).await.unwrap();

        let mut listed = queue.list(Some(QueueStatus::Pending)).await;
        listed[0].status = QueueStatus::Completed;
        listed.clear();

        assert_eq!(queue.stats().await.pending, 1);
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let (a, b) = {
            let queue = open_queue(&dir).await;
            let a = queue.enqueue(&url(1), Some("x")).await.unwrap();
            let b = queue.enqueue(&url(2), None).await.unwrap();
            queue.update_metadata(&a.id, Some("Title".into()), Some("Channel".into()))
                .await
                .unwrap();
            queue.move_earlier(&b.id).await.unwrap();
            (a, b)
        };

        let queue = open_queue(&dir).await;
        let items = queue.list(None).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, b.id);
        assert_eq!(items[1].title.as_deref(), Some("Title"));
        assert_eq!(items[1].channel.as_deref(), Some("Channel"));
        assert_eq!(items[1].id, a.id);
        assert!(queue.load_warning().is_none());
    }

    #[tokio::test]
    async fn test_interrupted_items_fail_on_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let queue = open_queue(&dir).await;
            queue.enqueue(&url(1), None).await.unwrap();
            queue.next_pending().await.unwrap().unwrap().id
        };

        let queue = open_queue(&dir).await;
        let item = queue.get(&id).await.unwrap();
        assert_eq!(item.status, QueueStatus::Failed);
        assert_eq!(item.error.as_deref(), Some(INTERRUPTED_ERROR));
        queue.retry_failed(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("queue.json"), b"[[[").unwrap();

        let queue = open_queue(&dir).await;
        assert!(queue.is_empty().await);
        assert!(queue.load_warning().unwrap().contains("unreadable"));
        assert!(dir.path().join("queue.json.corrupt").exists());

        queue.enqueue(&url(1), None).await.unwrap();
        assert_eq!(open_queue(&dir).await.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_state() {
        let dir = TempDir::new().unwrap();
        let queue_dir = dir.path().join("q");
        let config = QueueConfig {
            save_retry_delay: std::time::Duration::from_millis(1),
            ..QueueConfig::at(&queue_dir)
        };
        let queue = ProcessingQueue::open(config).await.unwrap();
        queue.enqueue(&url(1), None).await.unwrap();

        // Replace the directory with a file so every write fails.
        std::fs::remove_dir_all(&queue_dir).unwrap();
        std::fs::write(&queue_dir, b"").unwrap();

        let err = queue.enqueue(&url(2), None).await.unwrap_err();
        assert!(matches!(err, QueueError::Persistence(_)));
        assert_eq!(queue.len().await, 1);
    }
}
