//! The surface of the Looker API the core engine consumes (§6). The real
//! SDK wrapper lives outside this crate; LookerVault only depends on this
//! trait, so any conforming client (or the [`mock`] test double) can drive
//! the orchestrators.

pub mod mock;

use std::fmt::Debug;

use async_trait::async_trait;
use lv_types::ContentType;

/// Errors returned by a [`LookerClient`]. Carries an opaque inner error
/// plus a [`LookerClientErrorKind`] so callers can classify without
/// downcasting.
#[derive(Debug)]
pub struct LookerClientError {
    inner: Box<dyn std::error::Error + Send + Sync>,
    kind: LookerClientErrorKind,
}

impl LookerClientError {
    pub fn new(
        kind: LookerClientErrorKind,
        inner: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            inner: inner.into(),
            kind,
        }
    }

    pub fn rate_limited(inner: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::new(LookerClientErrorKind::RateLimited, inner)
    }

    pub fn not_found(inner: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::new(LookerClientErrorKind::NotFound, inner)
    }

    pub fn kind(&self) -> LookerClientErrorKind {
        self.kind
    }
}

impl std::fmt::Display for LookerClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "looker client error ({:?}): {}", self.kind, self.inner)
    }
}

impl std::error::Error for LookerClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

impl From<String> for LookerClientError {
    fn from(s: String) -> Self {
        Self::new(LookerClientErrorKind::Unknown, s)
    }
}

impl From<&'static str> for LookerClientError {
    fn from(s: &'static str) -> Self {
        Self::new(LookerClientErrorKind::Unknown, s)
    }
}

/// Classification of a [`LookerClientError`], mirroring §7's taxonomy for
/// the subset that originates at the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookerClientErrorKind {
    RateLimited,
    NotFound,
    Auth,
    Network,
    Server5xx,
    Timeout,
    Unknown,
}

impl LookerClientErrorKind {
    pub fn into_error_kind(self) -> lv_types::ErrorKind {
        match self {
            LookerClientErrorKind::RateLimited => lv_types::ErrorKind::RateLimited,
            LookerClientErrorKind::NotFound => lv_types::ErrorKind::NotFound,
            LookerClientErrorKind::Auth => lv_types::ErrorKind::Auth,
            LookerClientErrorKind::Network
            | LookerClientErrorKind::Server5xx
            | LookerClientErrorKind::Timeout => lv_types::ErrorKind::Transient,
            LookerClientErrorKind::Unknown => lv_types::ErrorKind::Storage,
        }
    }
}

impl lv_backoff::classify::Classified for LookerClientError {
    fn kind(&self) -> lv_types::ErrorKind {
        self.kind().into_error_kind()
    }
}

pub type Result<T> = std::result::Result<T, LookerClientError>;

/// A page of raw Looker objects, as returned by `list`. Each item is kept
/// as a `serde_json::Value` since the write-model shape varies per content
/// type; callers are responsible for interpreting it.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<serde_json::Value>,
    pub has_more: bool,
}

/// Connectivity probe response from `me()`.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub id: String,
    pub display_name: String,
}

/// The external collaborator surface consumed by the extraction and
/// restoration orchestrators (§6). Out of scope: the concrete SDK
/// transport, auth token refresh, and TLS configuration.
#[async_trait]
pub trait LookerClient: Debug + Send + Sync + 'static {
    async fn list(
        &self,
        content_type: ContentType,
        folder_id: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<Page>;

    async fn get(&self, content_type: ContentType, id: &str) -> Result<Option<serde_json::Value>>;

    async fn exists(&self, content_type: ContentType, id: &str) -> Result<bool>;

    async fn create(
        &self,
        content_type: ContentType,
        write_model: serde_json::Value,
    ) -> Result<String>;

    async fn update(
        &self,
        content_type: ContentType,
        id: &str,
        write_model: serde_json::Value,
    ) -> Result<()>;

    async fn me(&self) -> Result<Viewer>;

    async fn versions(&self) -> Result<String>;
}
