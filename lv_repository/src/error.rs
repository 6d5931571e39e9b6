use lv_types::ContentType;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("database error: {}", source))]
    Database { source: sqlx::Error },

    #[snafu(display("database busy after {} attempts", attempts))]
    StorageBusy { attempts: u32 },

    #[snafu(display("content item not found: {}/{}", content_type, id))]
    NotFound { content_type: ContentType, id: String },

    #[snafu(display("failed to (de)serialize json: {}", source))]
    Json { source: serde_json::Error },

    #[snafu(display("migration failed: {}", message))]
    Migration { message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Classification used by callers deciding whether to retry or DLQ
    /// (§7). `NotFound` is not retryable but is also not a `StorageError`
    /// in the taxonomy's sense; callers that need the update-then-create
    /// fallback match on `Error::NotFound` directly instead.
    pub fn kind(&self) -> lv_types::ErrorKind {
        match self {
            Error::Database { .. } | Error::Json { .. } | Error::Migration { .. } => {
                lv_types::ErrorKind::Storage
            }
            Error::StorageBusy { .. } => lv_types::ErrorKind::Transient,
            Error::NotFound { .. } => lv_types::ErrorKind::NotFound,
        }
    }
}
