//! Flags shared across subcommands, flattened into each subcommand's own
//! `Config` the way `clap_blocks::run_config::RunConfig` is flattened into
//! every `ioxd_*` server mode's `Config` in the teacher binary.

use std::time::Duration;

use lv_rate_limiter::RateLimiterConfig;
use lv_types::{ContentType, EngineConfig};

use crate::looker_http::LookerHttpConfig;

#[derive(Debug, Clone, clap::Parser)]
pub struct ConnectionArgs {
    /// Looker instance API base URL, e.g. https://looker.example.com:19999/api/4.0
    #[clap(long = "base-url", env = "LOOKERSDK_BASE_URL")]
    pub base_url: String,

    #[clap(long = "client-id", env = "LOOKERSDK_CLIENT_ID")]
    pub client_id: String,

    #[clap(long = "client-secret", env = "LOOKERSDK_CLIENT_SECRET")]
    pub client_secret: String,
}

impl From<ConnectionArgs> for LookerHttpConfig {
    fn from(args: ConnectionArgs) -> Self {
        LookerHttpConfig {
            base_url: args.base_url,
            client_id: args.client_id,
            client_secret: args.client_secret,
        }
    }
}

#[derive(Debug, Clone, clap::Parser)]
pub struct StorageArgs {
    /// Path to the local SQLite repository database.
    #[clap(long = "db-path", env = "LOOKERVAULT_DB_PATH", default_value = "lookervault.db")]
    pub db_path: String,
}

#[derive(Debug, Clone, clap::Parser)]
pub struct EngineArgs {
    #[clap(long, env = "LOOKERVAULT_WORKERS", default_value = "8")]
    pub workers: usize,

    #[clap(long = "rate-limit-per-minute", env = "LOOKERVAULT_RATE_LIMIT_PER_MINUTE", default_value = "1000")]
    pub rate_limit_per_minute: u32,

    #[clap(long = "rate-limit-per-second", env = "LOOKERVAULT_RATE_LIMIT_PER_SECOND", default_value = "10")]
    pub rate_limit_per_second: u32,

    #[clap(long = "checkpoint-interval", env = "LOOKERVAULT_CHECKPOINT_INTERVAL", default_value = "100")]
    pub checkpoint_interval: u32,

    #[clap(long = "max-retries", env = "LOOKERVAULT_MAX_RETRIES", default_value = "5")]
    pub max_retries: u32,

    #[clap(long = "page-size", env = "LOOKERVAULT_PAGE_SIZE", default_value = "100")]
    pub page_size: u32,
}

impl EngineArgs {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            workers: self.workers.max(1),
            rate_limit_per_minute: self.rate_limit_per_minute,
            rate_limit_per_second: self.rate_limit_per_second,
            checkpoint_interval: self.checkpoint_interval.max(1),
            max_retries: self.max_retries,
            request_timeout: Duration::from_secs(30),
            page_size: self.page_size,
        }
    }

    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            requests_per_minute: self.rate_limit_per_minute,
            requests_per_second: self.rate_limit_per_second,
            recovery_step: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, clap::Parser)]
pub struct OutputArgs {
    /// Emit a single JSON summary object to stdout instead of a plain
    /// stderr summary (spec.md §6).
    #[clap(long)]
    pub json: bool,
}

/// Parses a comma-separated `--content-types` value into the closed
/// `ContentType` set; an empty string means "every restorable type",
/// resolved by each command against `ContentType::RESTORABLE_ORDER`.
pub fn parse_content_types(raw: &str) -> Result<Vec<ContentType>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_uppercase().parse::<ContentType>())
        .collect()
}

pub fn parse_content_type(raw: &str) -> Result<ContentType, String> {
    raw.to_uppercase().parse::<ContentType>()
}
