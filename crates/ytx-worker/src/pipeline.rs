//! Pipeline orchestration: queue item in, rendered notes out.
//!
//! For each claimed item the pipeline
//! 1. fetches metadata and transcript (raw cache, network retry policy),
//! 2. derives the analysis (derived cache, LLM retry policy),
//! 3. renders the result and records the output reference on the item.
//!
//! The remote collaborators sit behind the traits below so the resilience
//! layer can be exercised with test doubles. No queue lock is held while a
//! collaborator runs.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn, Instrument};
use ytx_cache::{CacheKey, ContentCache, Namespace};
use ytx_models::{Analysis, ItemId, RawContent};
use ytx_queue::{ProcessingQueue, QueueItem};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::ItemLogger;
use crate::metrics;
use crate::retry::RetryPolicy;

/// Fetches metadata and transcript for a video.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch(&self, url: &str) -> WorkerResult<RawContent>;
}

/// Produces an analysis from raw content. This is the expensive call.
#[async_trait]
pub trait Deriver: Send + Sync {
    /// Everything the model is sent for `raw` apart from the model id:
    /// system instructions and the full user prompt. Two inputs share a
    /// derived cache entry only if this value is identical.
    fn key_material(&self, raw: &RawContent) -> String;

    async fn derive(&self, raw: &RawContent, model_id: &str) -> WorkerResult<Analysis>;
}

/// Turns an analysis into an output artifact and returns its reference.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        item: &QueueItem,
        raw: &RawContent,
        analysis: &Analysis,
    ) -> WorkerResult<String>;
}

/// What happened to a claimed item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Completed { id: ItemId, output_path: String },
    Failed { id: ItemId, error: String },
}

impl ItemOutcome {
    pub fn id(&self) -> &ItemId {
        match self {
            ItemOutcome::Completed { id, .. } | ItemOutcome::Failed { id, .. } => id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ItemOutcome::Completed { .. })
    }
}

/// Wires queue, cache, retry and collaborators together.
pub struct Pipeline {
    queue: Arc<ProcessingQueue>,
    cache: ContentCache,
    source: Arc<dyn TranscriptSource>,
    deriver: Arc<dyn Deriver>,
    renderer: Arc<dyn Renderer>,
    model_id: String,
    fetch_policy: RetryPolicy,
    derive_policy: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        config: &WorkerConfig,
        queue: Arc<ProcessingQueue>,
        cache: ContentCache,
        source: Arc<dyn TranscriptSource>,
        deriver: Arc<dyn Deriver>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let timeout = Some(config.attempt_timeout);
        Self {
            queue,
            cache,
            source,
            deriver,
            renderer,
            model_id: config.llm_model.clone(),
            fetch_policy: RetryPolicy::network("fetch").with_attempt_timeout(timeout),
            derive_policy: RetryPolicy::llm("derive").with_attempt_timeout(timeout),
        }
    }

    /// Replace the default retry policies.
    pub fn with_retry_policies(mut self, fetch: RetryPolicy, derive: RetryPolicy) -> Self {
        self.fetch_policy = fetch;
        self.derive_policy = derive;
        self
    }

    pub fn queue(&self) -> &Arc<ProcessingQueue> {
        &self.queue
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Raw content for `url`, from cache or the transcript source.
    pub async fn fetch_raw(&self, url: &str) -> WorkerResult<RawContent> {
        let key = CacheKey::raw(url);
        if let Some(raw) = self.cache.get_json::<RawContent>(&key).await {
            metrics::record_cache_hit(Namespace::Raw);
            debug!(url = %url, key = %key, "Using cached transcript");
            return Ok(raw);
        }
        metrics::record_cache_miss(Namespace::Raw);

        let raw = self
            .fetch_policy
            .execute(|| self.source.fetch(url), WorkerError::failure_class)
            .await
            .map_err(|e| WorkerError::from_retry(&self.fetch_policy.operation_name, e))?;

        self.store(&key, &raw).await;
        Ok(raw)
    }

    /// Analysis for `raw` under the configured model, from cache or the
    /// deriver.
    pub async fn derive(&self, raw: &RawContent) -> WorkerResult<Analysis> {
        let key = CacheKey::derived(
            &self.deriver.key_material(raw),
            &raw.transcript_text(),
            &self.model_id,
        );
        if let Some(analysis) = self.cache.get_json::<Analysis>(&key).await {
            metrics::record_cache_hit(Namespace::Derived);
            debug!(video_id = %raw.meta.video_id, key = %key, "Using cached analysis");
            return Ok(analysis);
        }
        metrics::record_cache_miss(Namespace::Derived);

        let started = Instant::now();
        let model_id = self.model_id.as_str();
        let analysis = self
            .derive_policy
            .execute(|| self.deriver.derive(raw, model_id), WorkerError::failure_class)
            .await
            .map_err(|e| WorkerError::from_retry(&self.derive_policy.operation_name, e))?;
        metrics::record_derive_duration(model_id, started.elapsed().as_secs_f64());

        self.store(&key, &analysis).await;
        Ok(analysis)
    }

    /// Cache write failures degrade to a warning; the result is still used.
    async fn store<T: serde::Serialize>(&self, key: &CacheKey, value: &T) {
        if let Err(e) = self.cache.put_json(key, value).await {
            metrics::record_cache_write_failure(key.namespace());
            warn!(key = %key, error = %e, "Failed to write cache entry, continuing without it");
        }
    }

    /// Run one item through fetch, derive and render. Returns the output
    /// reference.
    pub async fn process(&self, item: &QueueItem) -> WorkerResult<String> {
        let logger = ItemLogger::new(&item.id, "process");
        logger.log_start(&item.url);

        let raw = self.fetch_raw(&item.url).await?;
        logger.log_progress(&format!("transcript ready ({} lines)", raw.transcript.len()));

        let title = Some(raw.meta.title.clone()).filter(|t| !t.is_empty());
        let channel = Some(raw.meta.channel.clone()).filter(|c| !c.is_empty());
        if let Err(e) = self.queue.update_metadata(&item.id, title, channel).await {
            logger.log_warning(&format!("could not record metadata: {}", e));
        }

        let analysis = self.derive(&raw).await?;
        logger.log_progress("analysis ready");

        let output = self.renderer.render(item, &raw, &analysis).await?;
        logger.log_completion(&output);
        Ok(output)
    }

    /// Claim the next pending item and drive it to a terminal status.
    ///
    /// Returns `None` when nothing is pending. Processing errors end up on
    /// the item; only queue bookkeeping errors are returned.
    pub async fn run_next(&self) -> WorkerResult<Option<ItemOutcome>> {
        let Some(item) = self.queue.next_pending().await? else {
            metrics::set_queue_pending(0);
            return Ok(None);
        };
        metrics::set_queue_pending(self.queue.stats().await.pending);

        let started = Instant::now();
        let logger = ItemLogger::new(&item.id, "process");
        let result = self.process(&item).instrument(logger.create_span()).await;

        let outcome = match result {
            Ok(output_path) => {
                self.queue.complete(&item.id, output_path.clone()).await?;
                metrics::record_item_completed(started.elapsed().as_secs_f64());
                ItemOutcome::Completed {
                    id: item.id,
                    output_path,
                }
            }
            Err(e) => {
                let error = e.to_string();
                logger.log_error(&error);
                self.queue.fail(&item.id, error.clone()).await?;
                metrics::record_item_failed();
                ItemOutcome::Failed { id: item.id, error }
            }
        };
        Ok(Some(outcome))
    }
}
