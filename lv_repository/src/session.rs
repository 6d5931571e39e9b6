use lv_types::{Session, SessionStatus};
use snafu::ResultExt;
use sqlx::Row;
use uuid::Uuid;

use crate::content::parse_timestamp;
use crate::error::DatabaseSnafu;
use crate::{Repository, Result};

/// Which session table an operation targets. Extraction and restoration
/// sessions share a shape but live in separate tables (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Extraction,
    Restoration,
}

impl SessionKind {
    fn table(self) -> &'static str {
        match self {
            SessionKind::Extraction => "extraction_sessions",
            SessionKind::Restoration => "restoration_sessions",
        }
    }
}

impl Repository {
    /// Upsert by session `id`. `started_at` is never overwritten on update
    /// (§4.2, §8 upsert preservation).
    pub async fn create_session(&self, kind: SessionKind, session: &Session) -> Result<()> {
        let table = kind.table();
        let sql = format!(
            "INSERT INTO {table}
                (id, started_at, completed_at, status, total_items, success_count,
                 error_count, source_instance, destination_instance, config, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO NOTHING"
        );
        self.with_busy_retry(|| {
            sqlx::query(&sql)
                .bind(session.id.to_string())
                .bind(session.started_at.to_rfc3339())
                .bind(session.completed_at.map(|t| t.to_rfc3339()))
                .bind(status_str(session.status))
                .bind(session.total_items)
                .bind(session.success_count)
                .bind(session.error_count)
                .bind(&session.source_instance)
                .bind(&session.destination_instance)
                .bind(session.config.to_string())
                .bind(session.metadata.to_string())
                .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    /// Upsert by session `id`, preserving `started_at` (§4.2, §8).
    pub async fn update_session(&self, kind: SessionKind, session: &Session) -> Result<()> {
        let table = kind.table();
        let sql = format!(
            "UPDATE {table} SET
                completed_at = ?, status = ?, total_items = ?, success_count = ?,
                error_count = ?, source_instance = ?, destination_instance = ?,
                config = ?, metadata = ?
             WHERE id = ?"
        );
        self.with_busy_retry(|| {
            sqlx::query(&sql)
                .bind(session.completed_at.map(|t| t.to_rfc3339()))
                .bind(status_str(session.status))
                .bind(session.total_items)
                .bind(session.success_count)
                .bind(session.error_count)
                .bind(&session.source_instance)
                .bind(&session.destination_instance)
                .bind(session.config.to_string())
                .bind(session.metadata.to_string())
                .bind(session.id.to_string())
                .execute(self.pool())
        })
        .await?;
        Ok(())
    }

    pub async fn get_session(&self, kind: SessionKind, id: Uuid) -> Result<Option<Session>> {
        let table = kind.table();
        let sql = format!(
            "SELECT id, started_at, completed_at, status, total_items, success_count,
                    error_count, source_instance, destination_instance, config, metadata
             FROM {table} WHERE id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await
            .context(DatabaseSnafu)?;
        row.map(row_to_session).transpose()
    }
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Pending => "pending",
        SessionStatus::Running => "running",
        SessionStatus::Completed => "completed",
        SessionStatus::Failed => "failed",
        SessionStatus::Cancelled => "cancelled",
    }
}

fn parse_status(s: &str) -> SessionStatus {
    match s {
        "running" => SessionStatus::Running,
        "completed" => SessionStatus::Completed,
        "failed" => SessionStatus::Failed,
        "cancelled" => SessionStatus::Cancelled,
        _ => SessionStatus::Pending,
    }
}

fn row_to_session(row: sqlx::sqlite::SqliteRow) -> Result<Session> {
    let id: String = row.try_get("id").context(DatabaseSnafu)?;
    let started_at: String = row.try_get("started_at").context(DatabaseSnafu)?;
    let completed_at: Option<String> = row.try_get("completed_at").context(DatabaseSnafu)?;
    let status: String = row.try_get("status").context(DatabaseSnafu)?;
    let config: String = row.try_get("config").context(DatabaseSnafu)?;
    let metadata: String = row.try_get("metadata").context(DatabaseSnafu)?;

    Ok(Session {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        started_at: parse_timestamp(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
        status: parse_status(&status),
        total_items: row.try_get("total_items").context(DatabaseSnafu)?,
        success_count: row.try_get("success_count").context(DatabaseSnafu)?,
        error_count: row.try_get("error_count").context(DatabaseSnafu)?,
        config: serde_json::from_str(&config).unwrap_or(serde_json::Value::Null),
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        source_instance: row.try_get("source_instance").context(DatabaseSnafu)?,
        destination_instance: row.try_get("destination_instance").context(DatabaseSnafu)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::open_memory;
    use chrono::Utc;

    #[tokio::test]
    async fn update_session_never_overwrites_started_at() {
        let repo = open_memory().await;
        let mut session = Session::new_pending(Utc::now());
        session.destination_instance = Some("dest".into());
        repo.create_session(SessionKind::Restoration, &session)
            .await
            .unwrap();

        let original_started_at = session.started_at;
        session.status = SessionStatus::Running;
        session.started_at = Utc::now() + chrono::Duration::days(1); // attacker value, must be ignored
        repo.update_session(SessionKind::Restoration, &session)
            .await
            .unwrap();

        let fetched = repo
            .get_session(SessionKind::Restoration, session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.started_at.timestamp(), original_started_at.timestamp());
        assert_eq!(fetched.status, SessionStatus::Running);
    }
}
