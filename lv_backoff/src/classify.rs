//! Bridges the generic [`crate::Backoff`] retry loop to LookerVault's error
//! taxonomy (`lv_types::ErrorKind`), so callers retry exactly the kinds the
//! error-handling design (§7) calls retryable and surface everything else
//! immediately.

use lv_types::ErrorKind;
use observability_deps::tracing::info;

use crate::{Backoff, BackoffConfig};

/// An error that knows which taxonomy bucket it falls into.
pub trait Classified: std::error::Error {
    fn kind(&self) -> ErrorKind;
}

/// Outcome of [`retry_classified`].
#[derive(Debug)]
pub enum ClassifiedResult<B, E> {
    /// The operation eventually succeeded.
    Ok(B),
    /// The operation failed with a non-retryable kind; no further attempts
    /// were made.
    NonRetryable(E),
    /// `max_retries` retryable failures were observed without success.
    RetriesExhausted(E),
}

/// Repeatedly calls `do_stuff` until it succeeds, a non-retryable error is
/// observed, or `config.max_retries` retryable failures have occurred.
pub async fn retry_classified<F, F1, B, E>(
    config: &BackoffConfig,
    task_name: &str,
    mut do_stuff: F,
) -> ClassifiedResult<B, E>
where
    F: (FnMut() -> F1) + Send,
    F1: std::future::Future<Output = Result<B, E>> + Send,
    E: Classified + Send,
{
    let mut backoff = Backoff::new(&BackoffConfig {
        max_retries: None,
        ..config.clone()
    });
    let mut attempts = 0u32;

    loop {
        match do_stuff().await {
            Ok(b) => return ClassifiedResult::Ok(b),
            Err(e) if !e.kind().is_retryable() => return ClassifiedResult::NonRetryable(e),
            Err(e) => {
                attempts += 1;
                if let Some(max) = config.max_retries {
                    if attempts > max {
                        return ClassifiedResult::RetriesExhausted(e);
                    }
                }
                let backoff_dur = backoff.next();
                info!(
                    e=%e,
                    task_name,
                    attempt = attempts,
                    kind = %e.kind(),
                    backoff_secs = backoff_dur.as_secs_f64(),
                    "retryable error - backing off",
                );
                tokio::time::sleep(backoff_dur).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct TestError(ErrorKind);

    impl Classified for TestError {
        fn kind(&self) -> ErrorKind {
            self.0
        }
    }

    #[tokio::test]
    async fn non_retryable_returns_immediately() {
        let config = BackoffConfig {
            init_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            base: 2.,
            max_retries: Some(5),
        };
        let mut calls = 0;
        let result = retry_classified(&config, "test", || {
            calls += 1;
            async { Err::<(), _>(TestError(ErrorKind::Validation)) }
        })
        .await;
        assert!(matches!(result, ClassifiedResult::NonRetryable(_)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retryable_error_eventually_exhausts() {
        let config = BackoffConfig {
            init_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            base: 2.,
            max_retries: Some(2),
        };
        let mut calls = 0;
        let result = retry_classified(&config, "test", || {
            calls += 1;
            async { Err::<(), _>(TestError(ErrorKind::Transient)) }
        })
        .await;
        assert!(matches!(result, ClassifiedResult::RetriesExhausted(_)));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let config = BackoffConfig::default();
        let result: ClassifiedResult<u32, TestError> =
            retry_classified(&config, "test", || async { Ok(7) }).await;
        assert!(matches!(result, ClassifiedResult::Ok(7)));
    }
}
