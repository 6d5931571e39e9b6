//! `lookervault restore` — replays previously extracted content against a
//! (possibly different) Looker instance (spec.md §4.5).

use std::fmt;
use std::sync::Arc;

use lv_client::LookerClient;
use lv_metric::Registry;
use lv_repository::{DlqFilter, Repository, SessionKind};
use lv_restore::{RestorationOrchestrator, RestorationTypeSummary, LOCAL_INSTANCE};
use lv_time::SystemProvider;
use lv_types::{ContentType, Session, SessionStatus};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{parse_content_type, parse_content_types, ConnectionArgs, EngineArgs, OutputArgs, StorageArgs};
use crate::looker_http::LookerHttpClient;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("looker client error: {0}")]
    Client(#[from] lv_client::LookerClientError),

    #[error("repository error: {0}")]
    Repository(#[from] lv_repository::Error),

    #[error("restoration error: {0}")]
    Restore(#[from] lv_restore::Error),

    #[error("invalid --content-types: {0}")]
    InvalidContentTypes(String),

    #[error("no dead-letter item {0} found in session {1}")]
    DlqItemNotFound(Uuid, Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, clap::Parser)]
pub struct SharedArgs {
    #[clap(flatten)]
    pub connection: ConnectionArgs,
    #[clap(flatten)]
    pub storage: StorageArgs,
    #[clap(flatten)]
    pub engine: EngineArgs,
    #[clap(flatten)]
    pub output: OutputArgs,

    /// Label identifying the instance content was extracted from. Enables
    /// cross-instance ID remapping when it differs from the destination
    /// (spec.md §4.5.1).
    #[clap(long = "source-instance", default_value = "local")]
    pub source_instance: String,

    /// Treat this as a cross-instance restore: a missing ID mapping is a
    /// hard `Dependency` error instead of passing the source ID through
    /// unchanged.
    #[clap(long)]
    pub strict: bool,
}

#[derive(Debug, clap::Parser)]
pub struct Config {
    #[clap(subcommand)]
    pub command: RestoreCommand,
}

impl Config {
    pub fn wants_json(&self) -> bool {
        match &self.command {
            RestoreCommand::Single { shared, .. }
            | RestoreCommand::Bulk { shared, .. }
            | RestoreCommand::All { shared, .. }
            | RestoreCommand::Resume { shared, .. } => shared.output.json,
            RestoreCommand::Dlq { command } => match command {
                DlqCommand::List { output, .. }
                | DlqCommand::Show { output, .. }
                | DlqCommand::Clear { output, .. } => output.json,
                DlqCommand::Retry { shared, .. } => shared.output.json,
            },
        }
    }
}

#[derive(Debug, clap::Parser)]
pub enum RestoreCommand {
    /// Restore a single content item by id.
    Single {
        #[clap(flatten)]
        shared: SharedArgs,
        #[clap(long = "content-type", parse(try_from_str = parse_content_type))]
        content_type: ContentType,
        #[clap(long = "id")]
        content_id: String,
    },
    /// Restore one or more content types, honoring dependency order.
    Bulk {
        #[clap(flatten)]
        shared: SharedArgs,
        #[clap(long = "content-types")]
        content_types: String,
        #[clap(long = "resume")]
        session_id: Option<Uuid>,
    },
    /// Restore every restorable content type.
    All {
        #[clap(flatten)]
        shared: SharedArgs,
        #[clap(long)]
        force: bool,
        #[clap(long = "dry-run")]
        dry_run: bool,
    },
    /// Re-enter a prior bulk/all session, skipping already-completed items.
    Resume {
        #[clap(flatten)]
        shared: SharedArgs,
        #[clap(long = "session-id")]
        session_id: Uuid,
        #[clap(long = "content-types")]
        content_types: String,
    },
    /// Operator commands over the dead-letter queue.
    Dlq {
        #[clap(subcommand)]
        command: DlqCommand,
    },
}

#[derive(Debug, clap::Parser)]
pub enum DlqCommand {
    List {
        #[clap(flatten)]
        storage: StorageArgs,
        #[clap(flatten)]
        output: OutputArgs,
        #[clap(long = "session-id")]
        session_id: Option<Uuid>,
    },
    Show {
        #[clap(flatten)]
        storage: StorageArgs,
        #[clap(flatten)]
        output: OutputArgs,
        #[clap(long = "session-id")]
        session_id: Uuid,
        #[clap(long = "id")]
        id: Uuid,
    },
    Retry {
        #[clap(flatten)]
        shared: SharedArgs,
        #[clap(long = "session-id")]
        session_id: Uuid,
        #[clap(long = "id")]
        id: Uuid,
        #[clap(long = "cross-instance")]
        cross_instance: bool,
    },
    Clear {
        #[clap(flatten)]
        storage: StorageArgs,
        #[clap(flatten)]
        output: OutputArgs,
        #[clap(long = "session-id")]
        session_id: Uuid,
    },
}

#[derive(Debug, serde::Serialize)]
struct TypeSummaryView {
    content_type: String,
    items_restored: i64,
    items_failed: i64,
}

impl From<RestorationTypeSummary> for TypeSummaryView {
    fn from(s: RestorationTypeSummary) -> Self {
        Self {
            content_type: s.content_type.as_str().to_string(),
            items_restored: s.items_restored,
            items_failed: s.items_failed,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct Summary {
    session_id: Option<Uuid>,
    types: Vec<TypeSummaryView>,
    dlq_count: Option<u64>,
    dlq_items: Option<Vec<lv_types::DeadLetterItem>>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(session_id) = self.session_id {
            writeln!(f, "restoration session {session_id}")?;
        }
        for t in &self.types {
            writeln!(f, "  {:<16} restored={:<6} failed={}", t.content_type, t.items_restored, t.items_failed)?;
        }
        if let Some(count) = self.dlq_count {
            writeln!(f, "dlq: {count} item(s)")?;
        }
        if let Some(items) = &self.dlq_items {
            for item in items {
                writeln!(
                    f,
                    "  {} {}/{} retry={} kind={} {}",
                    item.id, item.content_type, item.content_id, item.retry_count, item.error_type, item.error_message
                )?;
            }
        }
        Ok(())
    }
}

async fn connect(shared: &SharedArgs) -> Result<(Repository, RestorationOrchestrator)> {
    let repository = Repository::open(&shared.storage.db_path).await?;
    let time_provider = Arc::new(SystemProvider::new());
    let registry = Registry::new();
    let client: Arc<dyn LookerClient> =
        Arc::new(LookerHttpClient::connect(shared.connection.clone().into()).await?);
    let orchestrator = RestorationOrchestrator::new(
        repository.clone(),
        client,
        time_provider,
        &registry,
        shared.engine.rate_limiter_config(),
    );
    Ok((repository, orchestrator))
}

fn new_session(now: chrono::DateTime<chrono::Utc>, source_instance: &str) -> Session {
    let mut session = Session::new_pending(now);
    session.source_instance = Some(source_instance.to_string());
    session
}

fn finish_session(session: &mut Session, result: &std::result::Result<Vec<RestorationTypeSummary>, lv_restore::Error>) {
    session.completed_at = Some(chrono::Utc::now());
    match result {
        Ok(summaries) => {
            session.status = SessionStatus::Completed;
            session.total_items = summaries.iter().map(|s| s.items_restored + s.items_failed).sum();
            session.success_count = summaries.iter().map(|s| s.items_restored).sum();
            session.error_count = summaries.iter().map(|s| s.items_failed).sum();
        }
        Err(lv_restore::Error::Cancelled) => session.status = SessionStatus::Cancelled,
        Err(_) => session.status = SessionStatus::Failed,
    }
}

async fn run_cancellable(
    orchestrator: &RestorationOrchestrator,
    session_id: Uuid,
    content_types: &[ContentType],
    source_instance: &str,
    strict: bool,
    engine_config: &lv_types::EngineConfig,
    cancel: &CancellationToken,
) -> std::result::Result<Vec<RestorationTypeSummary>, lv_restore::Error> {
    let run = orchestrator.restore_bulk(session_id, content_types, source_instance, strict, engine_config, cancel);
    tokio::pin!(run);
    tokio::select! {
        result = &mut run => result,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            run.await
        }
    }
}

pub async fn command(config: Config) -> Result<Summary> {
    match config.command {
        RestoreCommand::Single { shared, content_type, content_id } => {
            let (_repository, orchestrator) = connect(&shared).await?;
            orchestrator.restore_single(&shared.source_instance, shared.strict, content_type, &content_id).await?;
            Ok(Summary { session_id: None, types: vec![], dlq_count: None, dlq_items: None })
        }
        RestoreCommand::Bulk { shared, content_types, session_id } => {
            let (repository, orchestrator) = connect(&shared).await?;
            let content_types = resolve_content_types(&content_types)?;
            let session_id = session_id.unwrap_or_else(Uuid::new_v4);
            let now = chrono::Utc::now();
            let mut session = new_session(now, &shared.source_instance);
            session.id = session_id;
            repository.create_session(SessionKind::Restoration, &session).await?;

            let cancel = CancellationToken::new();
            let result = run_cancellable(
                &orchestrator,
                session_id,
                &content_types,
                &shared.source_instance,
                shared.strict,
                &shared.engine.engine_config(),
                &cancel,
            )
            .await;
            finish_session(&mut session, &result);
            repository.update_session(SessionKind::Restoration, &session).await?;

            let summaries = result?;
            Ok(Summary {
                session_id: Some(session_id),
                types: summaries.into_iter().map(TypeSummaryView::from).collect(),
                dlq_count: None,
                dlq_items: None,
            })
        }
        RestoreCommand::All { shared, force, dry_run } => {
            let (repository, orchestrator) = connect(&shared).await?;
            let session_id = Uuid::new_v4();
            let now = chrono::Utc::now();
            let mut session = new_session(now, &shared.source_instance);
            session.id = session_id;
            if !dry_run {
                repository.create_session(SessionKind::Restoration, &session).await?;
            }

            let cancel = CancellationToken::new();
            let engine_config = shared.engine.engine_config();
            let run = orchestrator.restore_all(
                session_id,
                &shared.source_instance,
                shared.strict,
                &engine_config,
                force,
                dry_run,
                &cancel,
            );
            tokio::pin!(run);
            let result = tokio::select! {
                result = &mut run => result,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    run.await
                }
            };

            if !dry_run {
                finish_session(&mut session, &result);
                repository.update_session(SessionKind::Restoration, &session).await?;
            }

            let summaries = result?;
            Ok(Summary {
                session_id: if dry_run { None } else { Some(session_id) },
                types: summaries.into_iter().map(TypeSummaryView::from).collect(),
                dlq_count: None,
                dlq_items: None,
            })
        }
        RestoreCommand::Resume { shared, session_id, content_types } => {
            let (repository, orchestrator) = connect(&shared).await?;
            let content_types = resolve_content_types(&content_types)?;
            let cancel = CancellationToken::new();
            let engine_config = shared.engine.engine_config();

            let run = orchestrator.restore_resume(
                session_id,
                &content_types,
                &shared.source_instance,
                shared.strict,
                &engine_config,
                &cancel,
            );
            tokio::pin!(run);
            let result = tokio::select! {
                result = &mut run => result,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    run.await
                }
            };

            if let Some(mut session) = repository.get_session(SessionKind::Restoration, session_id).await? {
                finish_session(&mut session, &result);
                repository.update_session(SessionKind::Restoration, &session).await?;
            }

            let summaries = result?;
            Ok(Summary {
                session_id: Some(session_id),
                types: summaries.into_iter().map(TypeSummaryView::from).collect(),
                dlq_count: None,
                dlq_items: None,
            })
        }
        RestoreCommand::Dlq { command } => dlq_command(command).await,
    }
}

fn resolve_content_types(raw: &str) -> Result<Vec<ContentType>> {
    if raw.trim().is_empty() {
        Ok(ContentType::RESTORABLE_ORDER.to_vec())
    } else {
        parse_content_types(raw).map_err(Error::InvalidContentTypes)
    }
}

async fn dlq_command(command: DlqCommand) -> Result<Summary> {
    match command {
        DlqCommand::List { storage, session_id, .. } => {
            let repository = Repository::open(&storage.db_path).await?;
            let items = repository
                .list_dlq(&DlqFilter { session_id, ..Default::default() })
                .await?;
            Ok(Summary {
                session_id: None,
                types: vec![],
                dlq_count: Some(items.len() as u64),
                dlq_items: Some(items),
            })
        }
        DlqCommand::Show { storage, session_id, id, .. } => {
            let repository = Repository::open(&storage.db_path).await?;
            let items = repository
                .list_dlq(&DlqFilter { session_id: Some(session_id), ..Default::default() })
                .await?;
            let item = items
                .into_iter()
                .find(|i| i.id == id)
                .ok_or(Error::DlqItemNotFound(id, session_id))?;
            Ok(Summary { session_id: None, types: vec![], dlq_count: None, dlq_items: Some(vec![item]) })
        }
        DlqCommand::Retry { shared, session_id, id, cross_instance } => {
            let (repository, orchestrator) = connect(&shared).await?;
            let items = repository
                .list_dlq(&DlqFilter { session_id: Some(session_id), ..Default::default() })
                .await?;
            let item = items
                .into_iter()
                .find(|i| i.id == id)
                .ok_or(Error::DlqItemNotFound(id, session_id))?;
            let cancel = CancellationToken::new();
            orchestrator
                .dlq_retry(Some(&shared.source_instance), cross_instance, &item, &cancel)
                .await?;
            Ok(Summary { session_id: None, types: vec![], dlq_count: None, dlq_items: None })
        }
        DlqCommand::Clear { storage, session_id, .. } => {
            let repository = Repository::open(&storage.db_path).await?;
            let items = repository
                .list_dlq(&DlqFilter { session_id: Some(session_id), ..Default::default() })
                .await?;
            let count = items.len() as u64;
            for item in items {
                repository.delete_dlq_item(item.id).await?;
            }
            Ok(Summary { session_id: None, types: vec![], dlq_count: Some(count), dlq_items: None })
        }
    }
}
