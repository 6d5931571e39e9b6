//! Component C4 (plus C3, the offset coordinator it drives): the
//! extraction orchestrator that pulls one content type's worth of Looker
//! objects into the repository, either by walking offsets sequentially or
//! by handing out disjoint offset windows to a pool of workers (§4.4).

mod error;
mod metrics;
mod offset;
mod strategy;
mod worker;

pub use error::{Error, ExtractionItemError, Result};
pub use offset::OffsetCoordinator;
pub use strategy::{select_strategy, FetchStrategy};

use std::sync::Arc;

use lv_backoff::BackoffConfig;
use lv_client::LookerClient;
use lv_metric::Registry;
use lv_rate_limiter::{RateLimiter, RateLimiterConfig};
use lv_repository::Repository;
use lv_time::TimeProvider;
use lv_types::{CheckpointData, ContentType, EngineConfig};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use metrics::ExtractionMetrics;
use worker::ExtractionState;

/// Per-page-fetch parameters a worker needs; cheap to clone into a spawned
/// task.
#[derive(Debug, Clone)]
pub(crate) struct WorkerLoopConfig {
    pub page_size: i64,
    pub checkpoint_interval: u32,
    /// Folder id bound directly into the SDK `list` call, for content
    /// types the Looker API lets callers filter by folder at fetch time.
    pub folder_id: Option<String>,
    /// Folder ids applied after the fact, for content types without
    /// SDK-level folder filtering (§4.4 folder filter, §9 open question 3).
    pub post_fetch_folder_filter: Option<Vec<String>>,
}

/// Outcome of extracting one content type.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionTypeSummary {
    pub content_type: ContentType,
    pub items_extracted: i64,
    pub items_failed: i64,
}

/// Drives extraction of one or more content types into a [`Repository`].
/// Cheap to clone: every field is itself `Arc`-backed or a clone-sharing
/// handle, which is what lets a single orchestrator spawn itself across a
/// worker pool (§4.4 parallel protocol).
#[derive(Clone)]
pub struct ExtractionOrchestrator {
    pub(crate) repository: Repository,
    pub(crate) client: Arc<dyn LookerClient>,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) time_provider: Arc<dyn TimeProvider>,
    pub(crate) backoff_config: BackoffConfig,
    pub(crate) metrics: ExtractionMetrics,
}

impl ExtractionOrchestrator {
    pub fn new(
        repository: Repository,
        client: Arc<dyn LookerClient>,
        time_provider: Arc<dyn TimeProvider>,
        registry: &Registry,
        rate_limiter_config: RateLimiterConfig,
    ) -> Self {
        let rate_limiter = RateLimiter::new(rate_limiter_config, time_provider.clone(), registry);
        let metrics = ExtractionMetrics::new(registry);
        Self {
            repository,
            client,
            rate_limiter,
            time_provider,
            backoff_config: BackoffConfig::default(),
            metrics,
        }
    }

    /// Extracts one content type, resuming from its latest incomplete
    /// checkpoint if one exists (§4.4 resume). `folder_ids` is honored at
    /// the SDK level for types that support it and as a post-fetch filter
    /// otherwise.
    pub async fn extract_content_type(
        &self,
        session_id: Uuid,
        content_type: ContentType,
        config: &EngineConfig,
        folder_ids: Option<&[String]>,
        cancel: &CancellationToken,
    ) -> Result<ExtractionTypeSummary> {
        let existing = self
            .repository
            .get_latest_checkpoint(lv_repository::SessionKind::Extraction, content_type, session_id)
            .await?;
        let (initial_data, resume_offset) = match existing {
            Some(cp) if !cp.is_complete() => {
                let offset = cp.checkpoint_data.last_offset.unwrap_or(0);
                (cp.checkpoint_data, offset)
            }
            _ => (CheckpointData::default(), 0),
        };

        let state = Arc::new(ExtractionState::new(initial_data));
        let strategy = select_strategy(content_type, config.workers);
        let sdk_filters_folders = content_type.supports_folder_filter();

        let folder_batches: Vec<Option<String>> = match (sdk_filters_folders, folder_ids) {
            (true, Some(ids)) if !ids.is_empty() => ids.iter().cloned().map(Some).collect(),
            _ => vec![None],
        };
        let post_fetch_filter = if sdk_filters_folders {
            None
        } else {
            folder_ids.map(|ids| ids.to_vec())
        };

        for folder_id in folder_batches {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let loop_config = WorkerLoopConfig {
                page_size: config.page_size as i64,
                checkpoint_interval: config.checkpoint_interval,
                folder_id,
                post_fetch_folder_filter: post_fetch_filter.clone(),
            };

            match strategy {
                FetchStrategy::Sequential => {
                    self.run_worker(
                        session_id,
                        content_type,
                        &loop_config,
                        resume_offset,
                        None,
                        &state,
                        cancel,
                    )
                    .await?;
                }
                FetchStrategy::Parallel => {
                    let coordinator = Arc::new(OffsetCoordinator::resuming_at(
                        loop_config.page_size,
                        resume_offset,
                    ));
                    let mut handles = Vec::with_capacity(config.workers);
                    for _ in 0..config.workers {
                        let this = self.clone();
                        let coordinator = coordinator.clone();
                        let state = state.clone();
                        let cancel = cancel.clone();
                        let loop_config = loop_config.clone();
                        handles.push(tokio::spawn(async move {
                            this.run_worker(
                                session_id,
                                content_type,
                                &loop_config,
                                0,
                                Some(coordinator),
                                &state,
                                &cancel,
                            )
                            .await
                        }));
                    }
                    for handle in handles {
                        handle.await.map_err(|_| Error::Cancelled)??;
                    }
                }
            }
        }

        self.flush_checkpoint(session_id, content_type, &state, true)
            .await?;

        Ok(ExtractionTypeSummary {
            content_type,
            items_extracted: state.total_extracted(),
            items_failed: state.total_failed(),
        })
    }

    /// Extracts every content type in `content_types`, in the order given.
    /// Unlike restoration, extraction has no cross-type dependency order to
    /// honor (§4.4), so the caller is free to pass any subset or ordering.
    pub async fn run_session(
        &self,
        session_id: Uuid,
        content_types: &[ContentType],
        config: &EngineConfig,
        folder_ids: Option<&[String]>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ExtractionTypeSummary>> {
        let mut summaries = Vec::with_capacity(content_types.len());
        for &content_type in content_types {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            summaries.push(
                self.extract_content_type(session_id, content_type, config, folder_ids, cancel)
                    .await?,
            );
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lv_client::mock::MockLookerClient;
    use lv_time::{MockProvider, Time};
    use serde_json::json;

    async fn orchestrator(client: Arc<MockLookerClient>) -> (ExtractionOrchestrator, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider::new(Time::from_timestamp_nanos(0)));
        let registry = Registry::new();
        let repository = Repository::open("sqlite::memory:").await.unwrap();
        let orchestrator = ExtractionOrchestrator::new(
            repository,
            client,
            provider.clone(),
            &registry,
            RateLimiterConfig {
                requests_per_minute: 10_000,
                requests_per_second: 1_000,
                recovery_step: std::time::Duration::from_secs(1),
            },
        );
        (orchestrator, provider)
    }

    #[tokio::test]
    async fn sequential_extraction_persists_every_item() {
        let client = Arc::new(MockLookerClient::new());
        for i in 0..5 {
            client.seed(
                ContentType::ScheduledPlan,
                &i.to_string(),
                json!({"id": format!("{i}"), "name": format!("plan {i}")}),
            );
        }
        let (orchestrator, _provider) = orchestrator(client).await;
        let cancel = CancellationToken::new();
        let mut config = EngineConfig::default();
        config.workers = 1;
        config.page_size = 2;

        let summary = orchestrator
            .extract_content_type(Uuid::new_v4(), ContentType::ScheduledPlan, &config, None, &cancel)
            .await
            .unwrap();
        assert_eq!(summary.items_extracted, 5);
        assert_eq!(summary.items_failed, 0);

        let stored = orchestrator
            .repository
            .list_content(ContentType::ScheduledPlan, &lv_types::ContentFilter::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), 5);
    }

    #[tokio::test]
    async fn parallel_extraction_covers_every_item_without_duplicates() {
        let client = Arc::new(MockLookerClient::new());
        for i in 0..40 {
            let id = format!("{i:03}");
            client.seed(
                ContentType::Dashboard,
                &id,
                json!({"id": id, "title": format!("dash {i}")}),
            );
        }
        let (orchestrator, _provider) = orchestrator(client).await;
        let cancel = CancellationToken::new();
        let mut config = EngineConfig::default();
        config.workers = 4;
        config.page_size = 5;

        let summary = orchestrator
            .extract_content_type(Uuid::new_v4(), ContentType::Dashboard, &config, None, &cancel)
            .await
            .unwrap();
        assert_eq!(summary.items_extracted, 40);

        let stored = orchestrator
            .repository
            .list_content(ContentType::Dashboard, &lv_types::ContentFilter::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), 40);
    }

    #[tokio::test]
    async fn resumes_from_checkpoint_without_reprocessing() {
        let client = Arc::new(MockLookerClient::new());
        for i in 0..6 {
            client.seed(
                ContentType::ScheduledPlan,
                &i.to_string(),
                json!({"id": format!("{i}"), "name": format!("plan {i}")}),
            );
        }
        let (orchestrator, _provider) = orchestrator(client).await;
        let session_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let mut config = EngineConfig::default();
        config.workers = 1;
        config.page_size = 2;

        // Pretend a prior run got partway through and left an incomplete
        // checkpoint.
        let mut partial = lv_types::Checkpoint::new(session_id, ContentType::ScheduledPlan, chrono::Utc::now());
        partial.checkpoint_data.mark_completed("0");
        partial.checkpoint_data.mark_completed("1");
        partial.checkpoint_data.last_offset = Some(0);
        orchestrator
            .repository
            .save_checkpoint(lv_repository::SessionKind::Extraction, &partial)
            .await
            .unwrap();

        let summary = orchestrator
            .extract_content_type(session_id, ContentType::ScheduledPlan, &config, None, &cancel)
            .await
            .unwrap();
        // Resuming re-walks the same offset window, so the already-completed
        // ids are skipped rather than re-saved; only the remaining 4 items
        // register as newly extracted.
        assert_eq!(summary.items_extracted, 4);
    }
}
