use lv_types::{ContentType, IDMapping};
use snafu::ResultExt;
use sqlx::Row;
use uuid::Uuid;

use crate::content::parse_timestamp;
use crate::error::DatabaseSnafu;
use crate::{Repository, Result};

impl Repository {
    /// Upsert by `(source_instance, content_type, source_id)` (§3, §4.5.1).
    pub async fn save_id_mapping(&self, mapping: &IDMapping) -> Result<()> {
        self.with_busy_retry(|| {
            sqlx::query(
                r#"INSERT INTO id_mappings
                    (source_instance, content_type, source_id, destination_id, created_at, session_id)
                   VALUES (?, ?, ?, ?, ?, ?)
                   ON CONFLICT (source_instance, content_type, source_id) DO UPDATE SET
                     destination_id = excluded.destination_id,
                     session_id = excluded.session_id"#,
            )
            .bind(&mapping.source_instance)
            .bind(mapping.content_type.as_str())
            .bind(&mapping.source_id)
            .bind(&mapping.destination_id)
            .bind(mapping.created_at.to_rfc3339())
            .bind(mapping.session_id.map(|id| id.to_string()))
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    pub async fn get_destination_id(
        &self,
        source_instance: &str,
        content_type: ContentType,
        source_id: &str,
    ) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT destination_id FROM id_mappings
             WHERE source_instance = ? AND content_type = ? AND source_id = ?",
        )
        .bind(source_instance)
        .bind(content_type.as_str())
        .bind(source_id)
        .fetch_optional(self.pool())
        .await
        .context(DatabaseSnafu)?;

        row.map(|r| r.try_get::<String, _>("destination_id").context(DatabaseSnafu))
            .transpose()
    }

    /// Looks up the full mapping row, for operator inspection (when, who,
    /// which session) rather than the foreign-key-remap fast path that only
    /// needs the destination id.
    pub async fn get_mapping(
        &self,
        source_instance: &str,
        content_type: ContentType,
        source_id: &str,
    ) -> Result<Option<IDMapping>> {
        let row = sqlx::query(
            "SELECT source_instance, content_type, source_id, destination_id, created_at, session_id
             FROM id_mappings
             WHERE source_instance = ? AND content_type = ? AND source_id = ?",
        )
        .bind(source_instance)
        .bind(content_type.as_str())
        .bind(source_id)
        .fetch_optional(self.pool())
        .await
        .context(DatabaseSnafu)?;

        row.map(row_to_mapping).transpose()
    }
}

fn row_to_mapping(row: sqlx::sqlite::SqliteRow) -> Result<IDMapping> {
    let content_type: String = row.try_get("content_type").context(DatabaseSnafu)?;
    let created_at: String = row.try_get("created_at").context(DatabaseSnafu)?;
    let session_id: Option<String> = row.try_get("session_id").context(DatabaseSnafu)?;
    Ok(IDMapping {
        source_instance: row.try_get("source_instance").context(DatabaseSnafu)?,
        content_type: content_type.parse().unwrap_or(ContentType::Explore),
        source_id: row.try_get("source_id").context(DatabaseSnafu)?,
        destination_id: row.try_get("destination_id").context(DatabaseSnafu)?,
        created_at: parse_timestamp(&created_at)?,
        session_id: session_id.and_then(|s| Uuid::parse_str(&s).ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::open_memory;
    use chrono::Utc;

    #[tokio::test]
    async fn mapping_upsert_overwrites_destination_id() {
        let repo = open_memory().await;
        let mapping = IDMapping::new("src", ContentType::Folder, "1", "100", Utc::now());
        repo.save_id_mapping(&mapping).await.unwrap();

        let mapping2 = IDMapping::new("src", ContentType::Folder, "1", "200", Utc::now());
        repo.save_id_mapping(&mapping2).await.unwrap();

        let dest = repo
            .get_destination_id("src", ContentType::Folder, "1")
            .await
            .unwrap();
        assert_eq!(dest.as_deref(), Some("200"));

        let full = repo
            .get_mapping("src", ContentType::Folder, "1")
            .await
            .unwrap()
            .expect("mapping row exists");
        assert_eq!(full.destination_id, "200");
        assert_eq!(full.source_id, "1");
    }
}
