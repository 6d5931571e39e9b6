//! `lookervault pack` — validates an edited export tree and writes
//! modified/new items back into the repository (spec.md §4.6).

use std::fmt;
use std::path::PathBuf;

use lv_pack::{PackOptions, PackSummary};
use lv_repository::Repository;

use crate::config::StorageArgs;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("repository error: {0}")]
    Repository(#[from] lv_repository::Error),

    #[error("pack error: {0}")]
    Pack(#[from] lv_pack::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, clap::Parser)]
pub struct Config {
    #[clap(flatten)]
    pub storage: StorageArgs,
    #[clap(flatten)]
    pub output: crate::config::OutputArgs,

    #[clap(long = "input-dir")]
    pub input_dir: PathBuf,

    /// Mark items present in the repository but absent from the export as
    /// deleted.
    #[clap(long)]
    pub force: bool,

    #[clap(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct Summary {
    scanned: usize,
    unchanged: usize,
    modified: usize,
    created: usize,
    deleted: usize,
}

impl From<PackSummary> for Summary {
    fn from(s: PackSummary) -> Self {
        Self {
            scanned: s.scanned,
            unchanged: s.unchanged,
            modified: s.modified,
            created: s.created,
            deleted: s.deleted,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "scanned={} unchanged={} modified={} created={} deleted={}",
            self.scanned, self.unchanged, self.modified, self.created, self.deleted
        )
    }
}

pub async fn command(config: Config) -> Result<Summary> {
    let repository = Repository::open(&config.storage.db_path).await?;
    let options = PackOptions {
        input_dir: config.input_dir,
        force: config.force,
        dry_run: config.dry_run,
    };
    let summary = lv_pack::pack(&repository, &options).await?;
    Ok(Summary::from(summary))
}
