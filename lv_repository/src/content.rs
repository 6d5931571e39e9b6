use chrono::{DateTime, Utc};
use lv_types::{ContentFilter, ContentItem, ContentType};
use snafu::ResultExt;
use sqlx::Row;

use crate::error::DatabaseSnafu;
use crate::{Repository, Result};

impl Repository {
    /// Upsert by `(content_type, id)`. Preserves the original `created_at`
    /// if the row already exists (§4.2, invariant 1).
    pub async fn save_content(&self, item: &ContentItem) -> Result<()> {
        self.with_busy_retry(|| {
            sqlx::query(
                r#"INSERT INTO content_items
                    (id, content_type, name, owner_id, folder_id, parent_id,
                     created_at, updated_at, deleted, content_data, content_size)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT (content_type, id) DO UPDATE SET
                     name = excluded.name,
                     owner_id = excluded.owner_id,
                     folder_id = excluded.folder_id,
                     parent_id = excluded.parent_id,
                     updated_at = excluded.updated_at,
                     deleted = excluded.deleted,
                     content_data = excluded.content_data,
                     content_size = excluded.content_size"#,
            )
            .bind(&item.id)
            .bind(item.content_type.as_str())
            .bind(&item.name)
            .bind(&item.owner_id)
            .bind(&item.folder_id)
            .bind(&item.parent_id)
            .bind(item.created_at.to_rfc3339())
            .bind(item.updated_at.to_rfc3339())
            .bind(item.deleted)
            .bind(&item.content_data)
            .bind(item.content_size)
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Upserts every item in `items` inside one transaction, so a pack
    /// batch either lands in full or not at all (§4.6 pack step 5).
    pub async fn save_content_batch(&self, items: &[ContentItem]) -> Result<()> {
        self.with_busy_retry(|| async {
            let mut tx = self.pool().begin().await?;
            for item in items {
                sqlx::query(
                    r#"INSERT INTO content_items
                        (id, content_type, name, owner_id, folder_id, parent_id,
                         created_at, updated_at, deleted, content_data, content_size)
                       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                       ON CONFLICT (content_type, id) DO UPDATE SET
                         name = excluded.name,
                         owner_id = excluded.owner_id,
                         folder_id = excluded.folder_id,
                         parent_id = excluded.parent_id,
                         updated_at = excluded.updated_at,
                         deleted = excluded.deleted,
                         content_data = excluded.content_data,
                         content_size = excluded.content_size"#,
                )
                .bind(&item.id)
                .bind(item.content_type.as_str())
                .bind(&item.name)
                .bind(&item.owner_id)
                .bind(&item.folder_id)
                .bind(&item.parent_id)
                .bind(item.created_at.to_rfc3339())
                .bind(item.updated_at.to_rfc3339())
                .bind(item.deleted)
                .bind(&item.content_data)
                .bind(item.content_size)
                .execute(&mut tx)
                .await?;
            }
            tx.commit().await
        })
        .await?;
        Ok(())
    }

    pub async fn get_content(
        &self,
        content_type: ContentType,
        id: &str,
    ) -> Result<Option<ContentItem>> {
        let row = sqlx::query(
            "SELECT id, content_type, name, owner_id, folder_id, parent_id, created_at,
                    updated_at, deleted, content_data, content_size
             FROM content_items WHERE content_type = ? AND id = ?",
        )
        .bind(content_type.as_str())
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .context(DatabaseSnafu)?;

        row.map(row_to_content_item).transpose()
    }

    pub async fn list_content(
        &self,
        content_type: ContentType,
        filter: &ContentFilter,
    ) -> Result<Vec<ContentItem>> {
        let mut sql = String::from(
            "SELECT id, content_type, name, owner_id, folder_id, parent_id, created_at,
                    updated_at, deleted, content_data, content_size
             FROM content_items WHERE content_type = ?",
        );
        if !filter.include_deleted {
            sql.push_str(" AND deleted = 0");
        }
        if let Some(folder_ids) = &filter.folder_ids {
            if !folder_ids.is_empty() {
                let placeholders = folder_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                sql.push_str(&format!(" AND folder_id IN ({placeholders})"));
            }
        }
        sql.push_str(" ORDER BY id ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = filter.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        let mut query = sqlx::query(&sql).bind(content_type.as_str());
        if let Some(folder_ids) = &filter.folder_ids {
            for fid in folder_ids {
                query = query.bind(fid);
            }
        }

        let rows = query.fetch_all(self.pool()).await.context(DatabaseSnafu)?;
        rows.into_iter().map(row_to_content_item).collect()
    }

    pub async fn count_content(
        &self,
        content_type: ContentType,
        filter: &ContentFilter,
    ) -> Result<i64> {
        let mut sql = String::from("SELECT COUNT(*) FROM content_items WHERE content_type = ?");
        if !filter.include_deleted {
            sql.push_str(" AND deleted = 0");
        }
        if let Some(folder_ids) = &filter.folder_ids {
            if !folder_ids.is_empty() {
                let placeholders = folder_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                sql.push_str(&format!(" AND folder_id IN ({placeholders})"));
            }
        }
        let mut query = sqlx::query_scalar(&sql).bind(content_type.as_str());
        if let Some(folder_ids) = &filter.folder_ids {
            for fid in folder_ids {
                query = query.bind(fid);
            }
        }
        query.fetch_one(self.pool()).await.context(DatabaseSnafu)
    }
}

fn row_to_content_item(row: sqlx::sqlite::SqliteRow) -> Result<ContentItem> {
    let content_type: String = row.try_get("content_type").context(DatabaseSnafu)?;
    let created_at: String = row.try_get("created_at").context(DatabaseSnafu)?;
    let updated_at: String = row.try_get("updated_at").context(DatabaseSnafu)?;

    Ok(ContentItem {
        id: row.try_get("id").context(DatabaseSnafu)?,
        content_type: content_type.parse().unwrap_or(ContentType::Explore),
        name: row.try_get("name").context(DatabaseSnafu)?,
        owner_id: row.try_get("owner_id").context(DatabaseSnafu)?,
        folder_id: row.try_get("folder_id").context(DatabaseSnafu)?,
        parent_id: row.try_get("parent_id").context(DatabaseSnafu)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        deleted: row.try_get("deleted").context(DatabaseSnafu)?,
        content_data: row.try_get("content_data").context(DatabaseSnafu)?,
        content_size: row.try_get("content_size").context(DatabaseSnafu)?,
    })
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| crate::Error::Migration {
            message: format!("invalid timestamp {s}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::open_memory;

    #[tokio::test]
    async fn save_content_is_idempotent() {
        let repo = open_memory().await;
        let now = Utc::now();
        let item = ContentItem::new("1", ContentType::Dashboard, "d1", vec![1, 2, 3], now);
        repo.save_content(&item).await.unwrap();
        repo.save_content(&item).await.unwrap();

        let fetched = repo
            .get_content(ContentType::Dashboard, "1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.content_data, vec![1, 2, 3]);
        assert_eq!(fetched.created_at.timestamp(), now.timestamp());
    }

    #[tokio::test]
    async fn save_content_preserves_created_at_on_update() {
        let repo = open_memory().await;
        let first_created = Utc::now();
        let mut item = ContentItem::new("1", ContentType::Look, "l1", vec![1], first_created);
        repo.save_content(&item).await.unwrap();

        item.updated_at = first_created + chrono::Duration::seconds(30);
        item.name = "renamed".into();
        repo.save_content(&item).await.unwrap();

        let fetched = repo
            .get_content(ContentType::Look, "1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.name, "renamed");
        assert_eq!(fetched.created_at.timestamp(), first_created.timestamp());
    }

    #[tokio::test]
    async fn list_content_orders_by_id_ascending() {
        let repo = open_memory().await;
        let now = Utc::now();
        for id in ["3", "1", "2"] {
            let item = ContentItem::new(id, ContentType::Look, format!("l{id}"), vec![], now);
            repo.save_content(&item).await.unwrap();
        }
        let items = repo
            .list_content(ContentType::Look, &ContentFilter::default())
            .await
            .unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }
}
