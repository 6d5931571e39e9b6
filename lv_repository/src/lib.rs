//! Component C2: the single persistent store for content items and
//! operational metadata (sessions, checkpoints, DLQ, ID mappings).
//!
//! Backed by SQLite via `sqlx`. Every mutating operation opens an
//! immediate-mode transaction so the write lock is acquired up front
//! rather than escalated mid-statement (§4.2, §5 locking discipline).

mod checkpoint;
mod content;
mod dlq;
mod error;
mod mapping;
mod migrations;
mod session;

pub use checkpoint::*;
pub use content::*;
pub use dlq::*;
pub use error::{Error, Result};
pub use mapping::*;
pub use session::*;

use std::str::FromStr;
use std::sync::Arc;

use lv_backoff::{Backoff, BackoffConfig};
use observability_deps::tracing::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use error::{DatabaseSnafu, StorageBusySnafu};
use snafu::ResultExt;

/// The content repository. Cheap to clone; clones share the same
/// connection pool.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    backoff_config: Arc<BackoffConfig>,
}

impl Repository {
    /// Opens (creating if necessary) a SQLite database at `path` and runs
    /// any pending migrations. Use `"sqlite::memory:"` for an ephemeral
    /// store, as tests do.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)
            .context(DatabaseSnafu)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await
            .context(DatabaseSnafu)?;

        let repo = Self {
            pool,
            backoff_config: Arc::new(BackoffConfig {
                init_backoff: std::time::Duration::from_millis(10),
                max_backoff: std::time::Duration::from_millis(500),
                base: 2.0,
                max_retries: Some(8),
            }),
        };
        repo.migrate().await?;
        Ok(repo)
    }

    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Retries an operation on "database is busy" with exponential backoff
    /// and jitter, surfacing a retriable [`Error::StorageBusy`] once the
    /// configured maximum is exhausted (§4.2 concurrency).
    async fn with_busy_retry<F, Fut, T>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        let mut backoff = Backoff::new(&self.backoff_config);
        let mut attempts = 0u32;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if is_busy(&e) => {
                    attempts += 1;
                    if attempts > self.backoff_config.max_retries.unwrap_or(u32::MAX) {
                        return StorageBusySnafu { attempts }.fail();
                    }
                    let wait = backoff_wait(&mut backoff);
                    debug!(attempts, wait_secs = wait.as_secs_f64(), "database busy, retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e).context(DatabaseSnafu),
            }
        }
    }
}

fn is_busy(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.message().contains("database is locked")
        || db.message().contains("busy"))
}

fn backoff_wait(backoff: &mut Backoff) -> std::time::Duration {
    backoff.next_interval()
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) async fn open_memory() -> Repository {
        Repository::open("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn migrate_runs_cleanly_on_fresh_db() {
        let repo = open_memory().await;
        let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(repo.pool())
            .await
            .unwrap();
        assert!(version >= 1);
    }
}
