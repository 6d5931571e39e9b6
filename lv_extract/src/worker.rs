use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lv_backoff::classify::{retry_classified, ClassifiedResult};
use lv_client::Page;
use lv_types::{CheckpointData, ContentItem, ContentType};
use observability_deps::tracing::warn;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::offset::OffsetCoordinator;
use crate::{Error, ExtractionItemError, ExtractionOrchestrator, Result};

/// Per-`(session, content_type)` mutable state shared by every worker
/// extracting that pair, whether there is one (sequential) or several
/// (parallel).
#[derive(Debug)]
pub(crate) struct ExtractionState {
    checkpoint: Mutex<CheckpointData>,
    items_since_checkpoint: AtomicU32,
    total_extracted: AtomicI64,
    total_failed: AtomicI64,
}

impl ExtractionState {
    pub(crate) fn new(initial: CheckpointData) -> Self {
        Self {
            checkpoint: Mutex::new(initial),
            items_since_checkpoint: AtomicU32::new(0),
            total_extracted: AtomicI64::new(0),
            total_failed: AtomicI64::new(0),
        }
    }

    pub(crate) fn checkpoint_snapshot(&self) -> CheckpointData {
        self.checkpoint.lock().clone()
    }

    pub(crate) fn total_extracted(&self) -> i64 {
        self.total_extracted.load(Ordering::Relaxed)
    }

    pub(crate) fn total_failed(&self) -> i64 {
        self.total_failed.load(Ordering::Relaxed)
    }

    fn is_completed(&self, id: &str) -> bool {
        self.checkpoint.lock().is_completed(id)
    }

    /// Records a successfully saved item and returns the running count of
    /// items extracted since the last checkpoint flush.
    fn record_success(&self, id: &str, offset: i64) -> u32 {
        {
            let mut cp = self.checkpoint.lock();
            cp.mark_completed(id);
            cp.last_offset = Some(offset);
        }
        self.total_extracted.fetch_add(1, Ordering::Relaxed);
        self.items_since_checkpoint.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn record_failure(&self) {
        self.total_failed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Builds the stored [`ContentItem`] for one raw page entry: the wire shape
/// varies per content type, so only the few fields the orchestrator and
/// restore path care about (`id`, a display name, and the foreign keys
/// remap walks) are pulled out explicitly; everything else rides along
/// inside the msgpack-encoded `content_data` blob (§3).
fn item_from_json(
    content_type: ContentType,
    value: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<ContentItem> {
    let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let name = value
        .get("title")
        .or_else(|| value.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let encoded = rmp_serde::to_vec(value)?;

    let mut item = ContentItem::new(id, content_type, name, encoded, now);
    item.folder_id = value.get("folder_id").and_then(|v| v.as_str()).map(String::from);
    item.owner_id = value
        .get("user_id")
        .or_else(|| value.get("owner_id"))
        .and_then(|v| v.as_str())
        .map(String::from);
    item.parent_id = value.get("parent_id").and_then(|v| v.as_str()).map(String::from);
    Ok(item)
}

impl ExtractionOrchestrator {
    /// Fetches one page, retrying transient/rate-limited failures with
    /// backoff (§4.4, §7). Every attempt passes through the rate limiter
    /// first so a worker never bursts past the configured ceiling while
    /// retrying.
    pub(crate) async fn fetch_page_with_retry(
        &self,
        content_type: ContentType,
        folder_id: Option<&str>,
        offset: i64,
        limit: i64,
        cancel: &CancellationToken,
    ) -> Result<Page> {
        let folder_id = folder_id.map(str::to_string);
        let result = retry_classified(&self.backoff_config, "extract_fetch_page", || {
            let folder_id = folder_id.clone();
            async move {
                self.rate_limiter
                    .acquire(cancel)
                    .await
                    .map_err(|_| lv_client::LookerClientError::from("acquire cancelled"))?;
                match self
                    .client
                    .list(content_type, folder_id.as_deref(), offset, limit)
                    .await
                {
                    Ok(page) => Ok(page),
                    Err(e) => {
                        if e.kind() == lv_client::LookerClientErrorKind::RateLimited {
                            self.rate_limiter.report_rate_limited();
                        }
                        Err(e)
                    }
                }
            }
        })
        .await;

        match result {
            ClassifiedResult::Ok(page) => Ok(page),
            ClassifiedResult::NonRetryable(e) | ClassifiedResult::RetriesExhausted(e) => {
                if cancel.is_cancelled() {
                    Err(Error::Cancelled)
                } else {
                    Err(Error::Client(e))
                }
            }
        }
    }

    pub(crate) async fn flush_checkpoint(
        &self,
        session_id: Uuid,
        content_type: ContentType,
        state: &ExtractionState,
        completed: bool,
    ) -> Result<()> {
        let now = self.time_provider.now().date_time();
        let mut checkpoint = lv_types::Checkpoint::new(session_id, content_type, now);
        checkpoint.checkpoint_data = state.checkpoint_snapshot();
        checkpoint.item_count = state.total_extracted();
        checkpoint.error_count = state.total_failed();
        if completed {
            checkpoint.completed_at = Some(now);
        }
        self.repository
            .save_checkpoint(lv_repository::SessionKind::Extraction, &checkpoint)
            .await?;
        Ok(())
    }

    /// Drives one worker's share of a `(session, content_type)` extraction.
    /// With `coordinator` set the worker claims disjoint offset windows
    /// until the stream is exhausted (parallel protocol); without one it
    /// walks offsets sequentially itself (§4.4).
    pub(crate) async fn run_worker(
        &self,
        session_id: Uuid,
        content_type: ContentType,
        workers_config: &crate::WorkerLoopConfig,
        mut sequential_offset: i64,
        coordinator: Option<Arc<OffsetCoordinator>>,
        state: &Arc<ExtractionState>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let offset = match &coordinator {
                Some(c) => match c.claim() {
                    Some(o) => o,
                    None => break,
                },
                None => sequential_offset,
            };

            let page = self
                .fetch_page_with_retry(
                    content_type,
                    workers_config.folder_id.as_deref(),
                    offset,
                    workers_config.page_size,
                    cancel,
                )
                .await?;
            let page_len = page.items.len();
            let exhausted = !page.has_more || (page_len as i64) < workers_config.page_size;

            let now = self.time_provider.now().date_time();
            for value in &page.items {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let id = value
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                if id.is_empty() || state.is_completed(&id) {
                    continue;
                }
                if let Some(ids) = &workers_config.post_fetch_folder_filter {
                    let belongs = value
                        .get("folder_id")
                        .and_then(|v| v.as_str())
                        .is_some_and(|f| ids.iter().any(|x| x == f));
                    if !belongs {
                        continue;
                    }
                }

                match item_from_json(content_type, value, now) {
                    Ok(item) => match self.repository.save_content(&item).await {
                        Ok(()) => {
                            self.metrics.items_extracted.inc(1);
                            let count = state.record_success(&id, offset);
                            if count % workers_config.checkpoint_interval == 0 {
                                self.flush_checkpoint(session_id, content_type, state, false)
                                    .await?;
                            }
                        }
                        Err(e) => {
                            let item_error = ExtractionItemError::new(id.clone(), Error::from(e));
                            warn!(error = %item_error, "failed to persist extracted item");
                            self.metrics.items_failed.inc(1);
                            state.record_failure();
                        }
                    },
                    Err(e) => {
                        let item_error = ExtractionItemError::new(id.clone(), e);
                        warn!(error = %item_error, "malformed item skipped");
                        self.metrics.items_failed.inc(1);
                        state.record_failure();
                    }
                }
            }

            match &coordinator {
                Some(c) => {
                    if exhausted {
                        c.mark_end();
                    }
                }
                None => {
                    if exhausted {
                        break;
                    }
                    sequential_offset += workers_config.page_size;
                }
            }
        }
        Ok(())
    }
}
