use std::sync::Arc;

use lv_backoff::classify::{retry_classified, Classified, ClassifiedResult};
use lv_client::LookerClientErrorKind;
use lv_types::{ContentItem, ContentType, DeadLetterItem};
use observability_deps::tracing::warn;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, RestoreItemError, Result};
use crate::remap::remap_foreign_keys;
use crate::state::RestoreState;
use crate::RestorationOrchestrator;

impl RestorationOrchestrator {
    /// Restores one content item: decode -> remap foreign keys -> probe
    /// `exists` -> update or create (§4.5 step 3). A fresh destination id
    /// from `create` is recorded so later items' foreign keys resolve
    /// against it.
    pub(crate) async fn restore_item(
        &self,
        source_instance: &str,
        strict: bool,
        item: &ContentItem,
    ) -> std::result::Result<(), RestoreItemError> {
        let mut value = rmp_serde::from_slice::<serde_json::Value>(&item.content_data)?;
        remap_foreign_keys(&self.repository, source_instance, strict, &mut value).await?;

        let exists = self.client.exists(item.content_type, &item.id).await?;
        if exists {
            self.client.update(item.content_type, &item.id, value).await?;
            Ok(())
        } else {
            let destination_id = self.client.create(item.content_type, value).await?;
            if destination_id != item.id {
                let now = self.time_provider.now().date_time();
                let mapping = lv_types::IDMapping::new(
                    source_instance,
                    item.content_type,
                    &item.id,
                    destination_id,
                    now,
                );
                self.repository.save_id_mapping(&mapping).await?;
            }
            Ok(())
        }
    }

    pub(crate) async fn flush_checkpoint(
        &self,
        session_id: Uuid,
        content_type: ContentType,
        state: &RestoreState,
        completed: bool,
    ) -> Result<()> {
        let now = self.time_provider.now().date_time();
        let mut checkpoint = lv_types::Checkpoint::new(session_id, content_type, now);
        checkpoint.checkpoint_data = state.checkpoint_snapshot();
        checkpoint.item_count = state.total_restored();
        checkpoint.error_count = state.total_failed();
        if completed {
            checkpoint.completed_at = Some(now);
        }
        self.repository
            .save_checkpoint(lv_repository::SessionKind::Restoration, &checkpoint)
            .await?;
        Ok(())
    }

    /// Runs one item through retry, then routes the terminal outcome: a
    /// retryable kind is retried by `retry_classified` itself; a
    /// non-retryable kind that `goes_to_dlq` is recorded and swallowed so
    /// the worker keeps going; `Auth` aborts the whole session (§7).
    pub(crate) async fn process_one(
        &self,
        session_id: Uuid,
        source_instance: &str,
        strict: bool,
        item: ContentItem,
        state: &Arc<RestoreState>,
        checkpoint_interval: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let result = retry_classified(&self.backoff_config, "restore_item", || {
            let item = &item;
            async move {
                self.rate_limiter
                    .acquire(cancel)
                    .await
                    .map_err(|_| RestoreItemError::Client("acquire cancelled".into()))?;
                match self.restore_item(source_instance, strict, item).await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        if let RestoreItemError::Client(c) = &e {
                            if c.kind() == LookerClientErrorKind::RateLimited {
                                self.rate_limiter.report_rate_limited();
                            }
                        }
                        Err(e)
                    }
                }
            }
        })
        .await;

        let count = match result {
            ClassifiedResult::Ok(()) => {
                self.metrics.items_restored.inc(1);
                state.record_success(&item.id)
            }
            ClassifiedResult::NonRetryable(e) | ClassifiedResult::RetriesExhausted(e) => {
                let kind = e.kind();
                if kind.aborts_session() {
                    return Err(Error::Aborted(kind));
                }
                warn!(content_id = %item.id, content_type = %item.content_type, error = %e, "item failed restoration");
                self.metrics.items_failed.inc(1);
                self.metrics.items_dead_lettered.inc(1);
                let now = self.time_provider.now().date_time();
                let dlq_item = DeadLetterItem::new(
                    session_id,
                    &item.id,
                    item.content_type,
                    item.content_data.clone(),
                    kind,
                    e.to_string(),
                    0,
                    now,
                );
                self.repository.save_dlq_item(&dlq_item).await?;
                state.record_failure(&item.id)
            }
        };

        if count % checkpoint_interval == 0 {
            self.flush_checkpoint(session_id, item.content_type, state, false)
                .await?;
        }
        Ok(())
    }
}
