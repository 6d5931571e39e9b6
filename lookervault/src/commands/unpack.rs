//! `lookervault unpack` — renders the repository into a directory tree of
//! YAML files (spec.md §4.6).

use std::fmt;
use std::path::PathBuf;

use lv_pack::{ExportMetadata, UnpackOptions, UnpackStrategy};
use lv_repository::Repository;

use crate::config::{parse_content_types, OutputArgs, StorageArgs};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("repository error: {0}")]
    Repository(#[from] lv_repository::Error),

    #[error("unpack error: {0}")]
    Unpack(#[from] lv_pack::Error),

    #[error("invalid --content-types: {0}")]
    InvalidContentTypes(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, clap::Parser)]
pub struct Config {
    #[clap(flatten)]
    pub storage: StorageArgs,
    #[clap(flatten)]
    pub output: OutputArgs,

    #[clap(long = "output-dir")]
    pub output_dir: PathBuf,

    #[clap(long, default_value = "full")]
    pub strategy: String,

    #[clap(long = "content-types", default_value = "")]
    pub content_types: String,
}

#[derive(Debug, serde::Serialize)]
pub struct Summary {
    total_items: i64,
    checksum: String,
}

impl From<ExportMetadata> for Summary {
    fn from(m: ExportMetadata) -> Self {
        Self { total_items: m.total_items, checksum: m.checksum }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "unpacked {} item(s)", self.total_items)?;
        writeln!(f, "checksum: {}", self.checksum)
    }
}

pub async fn command(config: Config) -> Result<Summary> {
    let repository = Repository::open(&config.storage.db_path).await?;
    let strategy = match config.strategy.to_lowercase().as_str() {
        "folder" => UnpackStrategy::Folder,
        _ => UnpackStrategy::Full,
    };
    let content_types =
        parse_content_types(&config.content_types).map_err(Error::InvalidContentTypes)?;

    let options = UnpackOptions { output_dir: config.output_dir, strategy, content_types };
    let metadata = lv_pack::unpack(&repository, &options).await?;
    Ok(Summary::from(metadata))
}
