use tracing_subscriber::{fmt, EnvFilter};

/// Output format for process logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colorized when attached to a TTY.
    Full,
    /// Newline-delimited JSON, one object per log line.
    Json,
}

/// Initializes the global tracing subscriber for the process.
///
/// `rust_log` is used as the default filter directive when `RUST_LOG` is not
/// set in the environment. Called once from `main`.
pub fn init_logging(rust_log: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(rust_log));

    let subscriber = fmt().with_env_filter(filter).with_target(true);

    match format {
        LogFormat::Full => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}
