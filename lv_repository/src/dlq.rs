use lv_types::{ContentType, DeadLetterItem, ErrorKind};
use snafu::ResultExt;
use sqlx::Row;
use uuid::Uuid;

use crate::content::parse_timestamp;
use crate::error::DatabaseSnafu;
use crate::{Repository, Result};

/// Filter criteria for [`Repository::list_dlq`].
#[derive(Debug, Clone, Default)]
pub struct DlqFilter {
    pub session_id: Option<Uuid>,
    pub content_type: Option<ContentType>,
    pub limit: Option<i64>,
}

impl Repository {
    /// Append/upsert by `(session_id, content_id, content_type,
    /// retry_count)` (§3, §8 DLQ uniqueness).
    pub async fn save_dlq_item(&self, item: &DeadLetterItem) -> Result<()> {
        self.with_busy_retry(|| {
            sqlx::query(
                r#"INSERT INTO dead_letter_queue
                    (id, session_id, content_id, content_type, content_data, error_message,
                     error_type, stack_trace, retry_count, failed_at, metadata)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT (session_id, content_id, content_type, retry_count) DO UPDATE SET
                     error_message = excluded.error_message,
                     error_type = excluded.error_type,
                     stack_trace = excluded.stack_trace,
                     failed_at = excluded.failed_at,
                     content_data = excluded.content_data,
                     metadata = excluded.metadata"#,
            )
            .bind(item.id.to_string())
            .bind(item.session_id.to_string())
            .bind(&item.content_id)
            .bind(item.content_type.as_str())
            .bind(&item.content_data)
            .bind(&item.error_message)
            .bind(item.error_type.to_string())
            .bind(&item.stack_trace)
            .bind(item.retry_count)
            .bind(item.failed_at.to_rfc3339())
            .bind(item.metadata.to_string())
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    pub async fn list_dlq(&self, filter: &DlqFilter) -> Result<Vec<DeadLetterItem>> {
        let mut sql = String::from(
            "SELECT id, session_id, content_id, content_type, content_data, error_message,
                    error_type, stack_trace, retry_count, failed_at, metadata
             FROM dead_letter_queue WHERE 1=1",
        );
        if filter.session_id.is_some() {
            sql.push_str(" AND session_id = ?");
        }
        if filter.content_type.is_some() {
            sql.push_str(" AND content_type = ?");
        }
        sql.push_str(" ORDER BY failed_at DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut query = sqlx::query(&sql);
        if let Some(session_id) = filter.session_id {
            query = query.bind(session_id.to_string());
        }
        if let Some(content_type) = filter.content_type {
            query = query.bind(content_type.as_str());
        }

        let rows = query.fetch_all(self.pool()).await.context(DatabaseSnafu)?;
        rows.into_iter().map(row_to_dlq_item).collect()
    }

    pub async fn delete_dlq_item(&self, id: Uuid) -> Result<()> {
        self.with_busy_retry(|| {
            sqlx::query("DELETE FROM dead_letter_queue WHERE id = ?")
                .bind(id.to_string())
                .execute(self.pool())
        })
        .await?;
        Ok(())
    }
}

fn row_to_dlq_item(row: sqlx::sqlite::SqliteRow) -> Result<DeadLetterItem> {
    let session_id: String = row.try_get("session_id").context(DatabaseSnafu)?;
    let id: String = row.try_get("id").context(DatabaseSnafu)?;
    let content_type: String = row.try_get("content_type").context(DatabaseSnafu)?;
    let error_type: String = row.try_get("error_type").context(DatabaseSnafu)?;
    let failed_at: String = row.try_get("failed_at").context(DatabaseSnafu)?;
    let metadata: String = row.try_get("metadata").context(DatabaseSnafu)?;

    Ok(DeadLetterItem {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        session_id: Uuid::parse_str(&session_id).unwrap_or_else(|_| Uuid::nil()),
        content_id: row.try_get("content_id").context(DatabaseSnafu)?,
        content_type: content_type.parse().unwrap_or(ContentType::Explore),
        content_data: row.try_get("content_data").context(DatabaseSnafu)?,
        error_message: row.try_get("error_message").context(DatabaseSnafu)?,
        error_type: parse_error_kind(&error_type),
        stack_trace: row.try_get("stack_trace").context(DatabaseSnafu)?,
        retry_count: row.try_get("retry_count").context(DatabaseSnafu)?,
        failed_at: parse_timestamp(&failed_at)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
    })
}

fn parse_error_kind(s: &str) -> ErrorKind {
    match s {
        "rate_limited" => ErrorKind::RateLimited,
        "transient" => ErrorKind::Transient,
        "not_found" => ErrorKind::NotFound,
        "dependency" => ErrorKind::Dependency,
        "storage" => ErrorKind::Storage,
        "auth" => ErrorKind::Auth,
        "cancelled" => ErrorKind::Cancelled,
        _ => ErrorKind::Validation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::open_memory;
    use chrono::Utc;

    #[tokio::test]
    async fn dlq_upsert_keeps_latest_message() {
        let repo = open_memory().await;
        let session_id = Uuid::new_v4();
        let mut item = DeadLetterItem::new(
            session_id,
            "42",
            ContentType::Look,
            vec![],
            ErrorKind::Validation,
            "first failure",
            0,
            Utc::now(),
        );
        repo.save_dlq_item(&item).await.unwrap();

        item.error_message = "second failure".into();
        repo.save_dlq_item(&item).await.unwrap();

        let items = repo
            .list_dlq(&DlqFilter {
                session_id: Some(session_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].error_message, "second failure");
    }
}
