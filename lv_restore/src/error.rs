use lv_backoff::classify::Classified;
use lv_client::LookerClientError;
use lv_types::ErrorKind;

/// One item's restoration failure, classified the same way extraction and
/// the rest of the engine classify errors (§7), so the orchestrator can
/// decide retry vs. DLQ vs. abort without matching on a concrete type.
#[derive(Debug, thiserror::Error)]
pub enum RestoreItemError {
    #[error("looker client error: {0}")]
    Client(#[from] LookerClientError),

    #[error("failed to decode stored content item: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("unresolved foreign key {field}={source_id}")]
    Dependency { field: &'static str, source_id: String },

    #[error("repository error: {0}")]
    Repository(#[from] lv_repository::Error),
}

impl Classified for RestoreItemError {
    fn kind(&self) -> ErrorKind {
        match self {
            RestoreItemError::Client(e) => e.kind().into_error_kind(),
            RestoreItemError::Decode(_) => ErrorKind::Validation,
            RestoreItemError::Dependency { .. } => ErrorKind::Dependency,
            RestoreItemError::Repository(e) => e.kind(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("looker client error: {0}")]
    Client(#[from] LookerClientError),

    #[error("repository error: {0}")]
    Repository(#[from] lv_repository::Error),

    #[error("content item {content_type}/{content_id} not found in the repository")]
    ContentNotFound {
        content_type: lv_types::ContentType,
        content_id: String,
    },

    #[error("restoration aborted: {0}")]
    Aborted(ErrorKind),

    #[error("restoration cancelled")]
    Cancelled,

    #[error("restore_all requires --force or --dry-run")]
    AllRequiresForceOrDryRun,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
