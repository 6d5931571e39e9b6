/// A single item that failed to extract (§4.4: the item is dropped from
/// the page, the orchestrator continues).
#[derive(Debug, thiserror::Error)]
#[error("failed to extract item {content_id}: {source}")]
pub struct ExtractionItemError {
    pub content_id: String,
    #[source]
    pub source: Box<Error>,
}

impl ExtractionItemError {
    pub fn new(content_id: impl Into<String>, source: Error) -> Self {
        Self { content_id: content_id.into(), source: Box::new(source) }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("looker client error: {0}")]
    Client(#[from] lv_client::LookerClientError),

    #[error("repository error: {0}")]
    Repository(#[from] lv_repository::Error),

    #[error("failed to encode content item: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("extraction cancelled")]
    Cancelled,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
