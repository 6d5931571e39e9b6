/// One file's validation failure, aggregated and reported together rather
/// than aborting the whole pack run on the first bad file (§4.6 Errors).
#[derive(Debug, thiserror::Error)]
#[error("{path}: {message}")]
pub struct ValidationFailure {
    pub path: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("repository error: {0}")]
    Repository(#[from] lv_repository::Error),

    #[error("failed to decode content item: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("failed to encode content item: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("circular folder reference detected starting at {0}")]
    CircularFolderReference(String),

    #[error("unsupported export schema version {found}, expected {expected}")]
    SchemaVersionMismatch { expected: u32, found: u32 },

    #[error("{} file(s) failed validation", .0.len())]
    ValidationFailed(Vec<ValidationFailure>),

    #[error("pack transaction failed: {0}")]
    TransactionFailed(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
