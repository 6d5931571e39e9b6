//! `lookervault extract` — pulls content out of a Looker instance into the
//! local repository (spec.md §4.4).

use std::fmt;
use std::sync::Arc;

use lv_client::LookerClient;
use lv_extract::{ExtractionOrchestrator, ExtractionTypeSummary};
use lv_metric::Registry;
use lv_repository::{Repository, SessionKind};
use lv_time::SystemProvider;
use lv_types::{ContentType, Session, SessionStatus};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{parse_content_types, ConnectionArgs, EngineArgs, OutputArgs, StorageArgs};
use crate::looker_http::LookerHttpClient;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("looker client error: {0}")]
    Client(#[from] lv_client::LookerClientError),

    #[error("repository error: {0}")]
    Repository(#[from] lv_repository::Error),

    #[error("extraction error: {0}")]
    Extract(#[from] lv_extract::Error),

    #[error("invalid --content-types: {0}")]
    InvalidContentTypes(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, clap::Parser)]
pub struct Config {
    #[clap(flatten)]
    pub connection: ConnectionArgs,
    #[clap(flatten)]
    pub storage: StorageArgs,
    #[clap(flatten)]
    pub engine: EngineArgs,
    #[clap(flatten)]
    pub output: OutputArgs,

    /// Comma-separated content types to extract; empty means every known
    /// type, including the read-only `Explore`.
    #[clap(long = "content-types", default_value = "")]
    pub content_types: String,

    /// Restrict extraction to these folder ids, for types that support
    /// folder scoping.
    #[clap(long = "folder-ids", use_value_delimiter = true)]
    pub folder_ids: Vec<String>,
}

#[derive(Debug, serde::Serialize)]
struct TypeSummaryView {
    content_type: String,
    items_extracted: i64,
    items_failed: i64,
}

impl From<ExtractionTypeSummary> for TypeSummaryView {
    fn from(s: ExtractionTypeSummary) -> Self {
        Self {
            content_type: s.content_type.as_str().to_string(),
            items_extracted: s.items_extracted,
            items_failed: s.items_failed,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct Summary {
    session_id: Uuid,
    types: Vec<TypeSummaryView>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "extraction session {}", self.session_id)?;
        for t in &self.types {
            writeln!(f, "  {:<16} extracted={:<6} failed={}", t.content_type, t.items_extracted, t.items_failed)?;
        }
        Ok(())
    }
}

fn default_content_types() -> Vec<ContentType> {
    let mut types = ContentType::RESTORABLE_ORDER.to_vec();
    types.push(ContentType::Explore);
    types
}

pub async fn command(config: Config) -> Result<Summary> {
    let content_types = if config.content_types.trim().is_empty() {
        default_content_types()
    } else {
        parse_content_types(&config.content_types).map_err(Error::InvalidContentTypes)?
    };

    let repository = Repository::open(&config.storage.db_path).await?;
    let time_provider = Arc::new(SystemProvider::new());
    let registry = Registry::new();
    let client: Arc<dyn LookerClient> =
        Arc::new(LookerHttpClient::connect(config.connection.into()).await?);

    let orchestrator = ExtractionOrchestrator::new(
        repository.clone(),
        client,
        time_provider,
        &registry,
        config.engine.rate_limiter_config(),
    );

    let now = chrono::Utc::now();
    let session_id = Uuid::new_v4();
    let mut session = Session::new_pending(now);
    session.id = session_id;
    repository.create_session(SessionKind::Extraction, &session).await?;

    let cancel = CancellationToken::new();
    let engine_config = config.engine.engine_config();
    let folder_ids = if config.folder_ids.is_empty() { None } else { Some(config.folder_ids.as_slice()) };

    let run = orchestrator.run_session(session_id, &content_types, &engine_config, folder_ids, &cancel);
    tokio::pin!(run);

    let result = tokio::select! {
        result = &mut run => result,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            run.await
        }
    };

    session.completed_at = Some(chrono::Utc::now());
    match &result {
        Ok(summaries) => {
            session.status = SessionStatus::Completed;
            session.total_items = summaries.iter().map(|s| s.items_extracted + s.items_failed).sum();
            session.success_count = summaries.iter().map(|s| s.items_extracted).sum();
            session.error_count = summaries.iter().map(|s| s.items_failed).sum();
        }
        Err(lv_extract::Error::Cancelled) => session.status = SessionStatus::Cancelled,
        Err(_) => session.status = SessionStatus::Failed,
    }
    repository.update_session(SessionKind::Extraction, &session).await?;

    let summaries = result?;
    Ok(Summary {
        session_id,
        types: summaries.into_iter().map(TypeSummaryView::from).collect(),
    })
}
