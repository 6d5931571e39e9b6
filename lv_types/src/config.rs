use std::time::Duration;

/// Shared configuration for the extraction and restoration orchestrators.
/// Populated by the CLI from flags/env; core code never reads environment
/// variables directly.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub workers: usize,
    pub rate_limit_per_minute: u32,
    pub rate_limit_per_second: u32,
    pub checkpoint_interval: u32,
    pub max_retries: u32,
    pub request_timeout: Duration,
    pub page_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            rate_limit_per_minute: 1_000,
            rate_limit_per_second: 10,
            checkpoint_interval: 100,
            max_retries: 5,
            request_timeout: Duration::from_secs(30),
            page_size: 100,
        }
    }
}
