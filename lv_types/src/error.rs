use serde::{Deserialize, Serialize};

/// The error taxonomy from which retry, DLQ and exit-code decisions are
/// made (§7). Every fallible operation in the core classifies its failure
/// into one of these kinds rather than matching on a concrete error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Client 429. Retried with the rate limiter's global slowdown.
    RateLimited,
    /// Network error, 5xx, timeout, or storage-busy. Retried.
    Transient,
    /// Client 404 on update; falls through to create, never retried as a
    /// failure in its own right.
    NotFound,
    /// Bad payload or missing required field. Goes to the DLQ (restore) or
    /// an aggregated report (pack); never retried.
    Validation,
    /// Missing foreign key or circular folder reference. DLQ / exit code 4.
    Dependency,
    /// Non-busy repository IO or constraint error. Surfaced directly.
    Storage,
    /// 401/403. Aborts the session.
    Auth,
    /// User or internal cancellation. Marks cancelled, flushes checkpoint.
    Cancelled,
}

impl ErrorKind {
    /// Whether the retry layer should retry an operation that failed with
    /// this kind (§7 propagation policy).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::Transient)
    }

    /// Whether a failure of this kind should be recorded in the DLQ rather
    /// than surfaced immediately or retried.
    pub fn goes_to_dlq(&self) -> bool {
        matches!(self, ErrorKind::Validation | ErrorKind::Dependency)
    }

    /// Whether this kind should abort the whole session outright.
    pub fn aborts_session(&self) -> bool {
        matches!(self, ErrorKind::Auth)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Transient => "transient",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Dependency => "dependency",
            ErrorKind::Storage => "storage",
            ErrorKind::Auth => "auth",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limited_and_transient_retry() {
        for kind in [ErrorKind::RateLimited, ErrorKind::Transient] {
            assert!(kind.is_retryable());
        }
        for kind in [
            ErrorKind::NotFound,
            ErrorKind::Validation,
            ErrorKind::Dependency,
            ErrorKind::Storage,
            ErrorKind::Auth,
            ErrorKind::Cancelled,
        ] {
            assert!(!kind.is_retryable());
        }
    }
}
