//! Operator commands over the dead letter queue (§4.5: `dlq list|show|retry|clear`).

use lv_backoff::classify::{retry_classified, ClassifiedResult};
use lv_client::LookerClientErrorKind;
use lv_repository::DlqFilter;
use lv_types::DeadLetterItem;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, Result, RestoreItemError};
use crate::{RestorationOrchestrator, LOCAL_INSTANCE};

impl RestorationOrchestrator {
    pub async fn dlq_list(&self, filter: &DlqFilter) -> Result<Vec<DeadLetterItem>> {
        Ok(self.repository.list_dlq(filter).await?)
    }

    pub async fn dlq_show(&self, session_id: Uuid, id: Uuid) -> Result<Option<DeadLetterItem>> {
        let items = self
            .repository
            .list_dlq(&DlqFilter {
                session_id: Some(session_id),
                ..Default::default()
            })
            .await?;
        Ok(items.into_iter().find(|item| item.id == id))
    }

    /// Re-attempts restoration of a single dead-lettered item, using its
    /// stored `content_data` rather than re-reading from `content_items`
    /// (the original extraction row may since have changed). Gated by the
    /// same rate limiter and `retry_classified` backoff as `restore_item`
    /// (§4.1 "gate all outbound Looker calls"). Deletes the DLQ row on
    /// success; leaves it in place (bumping `retry_count` on the next
    /// failure) otherwise.
    pub async fn dlq_retry(
        &self,
        source_instance: Option<&str>,
        cross_instance: bool,
        item: &DeadLetterItem,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let source_instance = source_instance.unwrap_or(LOCAL_INSTANCE);

        let result = retry_classified(&self.backoff_config, "dlq_retry", || {
            let item = &item;
            async move {
                if cancel.is_cancelled() {
                    return Err(RestoreItemError::Client("dlq retry cancelled".into()));
                }

                let mut value = rmp_serde::from_slice::<serde_json::Value>(&item.content_data)?;
                crate::remap::remap_foreign_keys(&self.repository, source_instance, cross_instance, &mut value)
                    .await?;

                self.rate_limiter
                    .acquire(cancel)
                    .await
                    .map_err(|_| RestoreItemError::Client("acquire cancelled".into()))?;

                let exists = self.client.exists(item.content_type, &item.content_id).await;
                let exists = exists.map_err(|e| self.note_rate_limited_then(e))?;
                let outcome = if exists {
                    self.client.update(item.content_type, &item.content_id, value).await
                } else {
                    self.client.create(item.content_type, value).await.map(|_| ())
                };
                outcome.map_err(|e| self.note_rate_limited_then(e))
            }
        })
        .await;

        match result {
            ClassifiedResult::Ok(()) => {
                self.repository.delete_dlq_item(item.id).await?;
                Ok(())
            }
            ClassifiedResult::NonRetryable(e) | ClassifiedResult::RetriesExhausted(e) => {
                Err(match e {
                    RestoreItemError::Client(c) => Error::Client(c),
                    RestoreItemError::Repository(r) => Error::Repository(r),
                    other => Error::Client(other.to_string().into()),
                })
            }
        }
    }

    fn note_rate_limited_then(&self, e: lv_client::LookerClientError) -> RestoreItemError {
        if e.kind() == LookerClientErrorKind::RateLimited {
            self.rate_limiter.report_rate_limited();
        }
        e.into()
    }

    pub async fn dlq_clear(&self, session_id: Uuid) -> Result<u64> {
        let items = self
            .repository
            .list_dlq(&DlqFilter {
                session_id: Some(session_id),
                ..Default::default()
            })
            .await?;
        let count = items.len() as u64;
        for item in items {
            self.repository.delete_dlq_item(item.id).await?;
        }
        Ok(count)
    }
}
