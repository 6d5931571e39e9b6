//! Schema evolution (§4.2). The repository keeps a `schema_version` row
//! and applies numbered migrations in order. Migration 2 retrofits the
//! unique constraints the upsert semantics depend on by rewriting the
//! affected tables inside a single transaction with foreign keys
//! temporarily disabled, then recreating indexes.

use observability_deps::tracing::info;
use sqlx::SqlitePool;

use crate::error::{DatabaseSnafu, MigrationSnafu};
use crate::Result;
use snafu::ResultExt;

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_1), (2, MIGRATION_2)];

pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL,
            description TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await
    .context(DatabaseSnafu)?;

    let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(pool)
        .await
        .context(DatabaseSnafu)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        info!(version, "applying repository migration");
        let mut tx = pool.begin().await.context(DatabaseSnafu)?;
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&mut tx)
                .await
                .map_err(|_| {
                    MigrationSnafu {
                        message: format!("migration {version} failed on statement: {statement}"),
                    }
                    .build()
                })?;
        }
        sqlx::query("INSERT INTO schema_version (version, applied_at, description) VALUES (?, ?, ?)")
            .bind(version)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(migration_description(*version))
            .execute(&mut tx)
            .await
            .context(DatabaseSnafu)?;
        tx.commit().await.context(DatabaseSnafu)?;
    }

    Ok(())
}

fn migration_description(version: i64) -> &'static str {
    match version {
        1 => "initial schema",
        2 => "unique constraints for upsert semantics",
        _ => "unknown",
    }
}

const MIGRATION_1: &str = r#"
CREATE TABLE content_items (
    id TEXT NOT NULL,
    content_type TEXT NOT NULL,
    name TEXT NOT NULL,
    owner_id TEXT,
    folder_id TEXT,
    parent_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    content_data BLOB NOT NULL,
    content_size INTEGER NOT NULL,
    PRIMARY KEY (content_type, id)
);
CREATE INDEX idx_content_items_type ON content_items (content_type, id);
CREATE INDEX idx_content_items_folder ON content_items (folder_id);

CREATE TABLE extraction_sessions (
    id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    total_items INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0,
    config TEXT NOT NULL DEFAULT '{}',
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE restoration_sessions (
    id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    total_items INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0,
    source_instance TEXT,
    destination_instance TEXT,
    config TEXT NOT NULL DEFAULT '{}',
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE sync_checkpoints (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    content_type TEXT NOT NULL,
    checkpoint_data TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    item_count INTEGER NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0,
    kind TEXT NOT NULL
);
CREATE INDEX idx_sync_checkpoints_session ON sync_checkpoints (session_id);

CREATE TABLE id_mappings (
    source_instance TEXT NOT NULL,
    content_type TEXT NOT NULL,
    source_id TEXT NOT NULL,
    destination_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    session_id TEXT,
    PRIMARY KEY (source_instance, content_type, source_id)
);

CREATE TABLE dead_letter_queue (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    content_id TEXT NOT NULL,
    content_type TEXT NOT NULL,
    content_data BLOB NOT NULL,
    error_message TEXT NOT NULL,
    error_type TEXT NOT NULL,
    stack_trace TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0,
    failed_at TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX idx_dlq_session ON dead_letter_queue (session_id);
CREATE INDEX idx_dlq_failed_at ON dead_letter_queue (failed_at DESC);
"#;

// Retrofits the natural-key unique constraints the upsert operations rely
// on (§4.2 schema evolution, §9 open question 1: `started_at` is folded
// into `(session_id, content_type)` rather than requiring sub-millisecond
// timestamp uniqueness).
const MIGRATION_2: &str = r#"
PRAGMA foreign_keys=OFF;

CREATE TABLE sync_checkpoints_new (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    content_type TEXT NOT NULL,
    checkpoint_data TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    item_count INTEGER NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0,
    kind TEXT NOT NULL,
    UNIQUE (session_id, content_type, kind)
);
INSERT INTO sync_checkpoints_new SELECT * FROM sync_checkpoints;
DROP TABLE sync_checkpoints;
ALTER TABLE sync_checkpoints_new RENAME TO sync_checkpoints;
CREATE INDEX idx_sync_checkpoints_session ON sync_checkpoints (session_id);

CREATE TABLE dead_letter_queue_new (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    content_id TEXT NOT NULL,
    content_type TEXT NOT NULL,
    content_data BLOB NOT NULL,
    error_message TEXT NOT NULL,
    error_type TEXT NOT NULL,
    stack_trace TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0,
    failed_at TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    UNIQUE (session_id, content_id, content_type, retry_count)
);
INSERT INTO dead_letter_queue_new SELECT * FROM dead_letter_queue;
DROP TABLE dead_letter_queue;
ALTER TABLE dead_letter_queue_new RENAME TO dead_letter_queue;
CREATE INDEX idx_dlq_session ON dead_letter_queue (session_id);
CREATE INDEX idx_dlq_failed_at ON dead_letter_queue (failed_at DESC);

PRAGMA foreign_keys=ON;
"#;
