use lv_types::{Checkpoint, CheckpointData, ContentType};
use snafu::ResultExt;
use sqlx::Row;
use uuid::Uuid;

use crate::content::parse_timestamp;
use crate::error::DatabaseSnafu;
use crate::session::SessionKind;
use crate::{Repository, Result};

fn kind_str(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::Extraction => "extraction",
        SessionKind::Restoration => "restoration",
    }
}

impl Repository {
    /// Upsert by `(session_id, content_type)` (§9 open question 1: this
    /// implementation folds `started_at` out of the natural key and keeps
    /// a single active checkpoint per pair rather than requiring
    /// sub-millisecond timestamp uniqueness).
    pub async fn save_checkpoint(&self, kind: SessionKind, checkpoint: &Checkpoint) -> Result<()> {
        let data = serde_json::to_string(&checkpoint.checkpoint_data).context(crate::error::JsonSnafu)?;
        self.with_busy_retry(|| {
            sqlx::query(
                r#"INSERT INTO sync_checkpoints
                    (id, session_id, content_type, checkpoint_data, started_at,
                     completed_at, item_count, error_count, kind)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT (session_id, content_type, kind) DO UPDATE SET
                     checkpoint_data = excluded.checkpoint_data,
                     completed_at = excluded.completed_at,
                     item_count = excluded.item_count,
                     error_count = excluded.error_count"#,
            )
            .bind(checkpoint.id.to_string())
            .bind(checkpoint.session_id.to_string())
            .bind(checkpoint.content_type.as_str())
            .bind(&data)
            .bind(checkpoint.started_at.to_rfc3339())
            .bind(checkpoint.completed_at.map(|t| t.to_rfc3339()))
            .bind(checkpoint.item_count)
            .bind(checkpoint.error_count)
            .bind(kind_str(kind))
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    pub async fn get_latest_checkpoint(
        &self,
        kind: SessionKind,
        content_type: ContentType,
        session_id: Uuid,
    ) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT id, session_id, content_type, checkpoint_data, started_at, completed_at,
                    item_count, error_count
             FROM sync_checkpoints
             WHERE session_id = ? AND content_type = ? AND kind = ?
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(session_id.to_string())
        .bind(content_type.as_str())
        .bind(kind_str(kind))
        .fetch_optional(self.pool())
        .await
        .context(DatabaseSnafu)?;

        row.map(row_to_checkpoint).transpose()
    }
}

fn row_to_checkpoint(row: sqlx::sqlite::SqliteRow) -> Result<Checkpoint> {
    let id: String = row.try_get("id").context(DatabaseSnafu)?;
    let session_id: String = row.try_get("session_id").context(DatabaseSnafu)?;
    let content_type: String = row.try_get("content_type").context(DatabaseSnafu)?;
    let checkpoint_data: String = row.try_get("checkpoint_data").context(DatabaseSnafu)?;
    let started_at: String = row.try_get("started_at").context(DatabaseSnafu)?;
    let completed_at: Option<String> = row.try_get("completed_at").context(DatabaseSnafu)?;

    Ok(Checkpoint {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        session_id: Uuid::parse_str(&session_id).unwrap_or_else(|_| Uuid::nil()),
        content_type: content_type.parse().unwrap_or(ContentType::Explore),
        checkpoint_data: serde_json::from_str::<CheckpointData>(&checkpoint_data)
            .unwrap_or_default(),
        started_at: parse_timestamp(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
        item_count: row.try_get("item_count").context(DatabaseSnafu)?,
        error_count: row.try_get("error_count").context(DatabaseSnafu)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::open_memory;
    use chrono::Utc;

    #[tokio::test]
    async fn later_checkpoint_overwrites_earlier_for_same_pair() {
        let repo = open_memory().await;
        let session_id = Uuid::new_v4();
        let mut checkpoint = Checkpoint::new(session_id, ContentType::Dashboard, Utc::now());
        checkpoint.checkpoint_data.mark_completed("1");
        repo.save_checkpoint(SessionKind::Restoration, &checkpoint)
            .await
            .unwrap();

        checkpoint.checkpoint_data.mark_completed("2");
        checkpoint.item_count = 2;
        repo.save_checkpoint(SessionKind::Restoration, &checkpoint)
            .await
            .unwrap();

        let latest = repo
            .get_latest_checkpoint(SessionKind::Restoration, ContentType::Dashboard, session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.item_count, 2);
        assert!(latest.checkpoint_data.is_completed("1"));
        assert!(latest.checkpoint_data.is_completed("2"));
    }
}
