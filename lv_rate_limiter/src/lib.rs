//! Global sliding-window admission control with adaptive slowdown on
//! rate-limit signals (component C1).
//!
//! A single [`RateLimiter`] is shared by every worker of a session. It
//! bounds outbound Looker calls so that a sliding one-minute window never
//! exceeds `requests_per_minute` and a sliding one-second window never
//! exceeds `requests_per_second`. When the Looker client reports a
//! rate-limit signal, the effective caps are halved and recover one step
//! at a time as requests continue to succeed.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use lv_metric::{Metric, Registry, U64Counter};
use lv_time::{Time, TimeProvider};
use observability_deps::tracing::{debug, warn};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

const ONE_MINUTE: Duration = Duration::from_secs(60);
const ONE_SECOND: Duration = Duration::from_secs(1);

/// Error returned by [`RateLimiter::acquire`] when the caller's
/// cancellation token fires before admission is granted.
#[derive(Debug, thiserror::Error)]
#[error("rate limiter acquire cancelled")]
pub struct Cancelled;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub requests_per_minute: u32,
    pub requests_per_second: u32,
    /// How long a halved rate must hold before the limiter restores one
    /// step toward the configured ceiling.
    pub recovery_step: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 1_000,
            requests_per_second: 10,
            recovery_step: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
struct State {
    minute_window: VecDeque<Time>,
    second_window: VecDeque<Time>,
    effective_per_minute: u32,
    effective_per_second: u32,
    recovery_deadline: Option<Time>,
}

impl State {
    fn new(config: &RateLimiterConfig) -> Self {
        Self {
            minute_window: VecDeque::new(),
            second_window: VecDeque::new(),
            effective_per_minute: config.requests_per_minute,
            effective_per_second: config.requests_per_second,
            recovery_deadline: None,
        }
    }

    fn prune(&mut self, now: Time) {
        while let Some(front) = self.minute_window.front() {
            match now.checked_duration_since(*front) {
                Some(d) if d > ONE_MINUTE => {
                    self.minute_window.pop_front();
                }
                _ => break,
            }
        }
        while let Some(front) = self.second_window.front() {
            match now.checked_duration_since(*front) {
                Some(d) if d > ONE_SECOND => {
                    self.second_window.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Earliest instant at which a new admission would keep both windows
    /// within their effective caps, or `None` if admission is immediate.
    fn next_admissible(&self, now: Time) -> Option<Time> {
        let minute_wait = if self.minute_window.len() >= self.effective_per_minute as usize {
            self.minute_window
                .front()
                .and_then(|t| t.checked_add(ONE_MINUTE))
        } else {
            None
        };
        let second_wait = if self.second_window.len() >= self.effective_per_second as usize {
            self.second_window
                .front()
                .and_then(|t| t.checked_add(ONE_SECOND))
        } else {
            None
        };
        match (minute_wait, second_wait) {
            (Some(a), Some(b)) => Some(if a.timestamp_nanos() > b.timestamp_nanos() {
                a
            } else {
                b
            }),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
        .filter(|t| now.checked_duration_since(*t).is_none())
    }

    fn record_admission(&mut self, now: Time) {
        self.minute_window.push_back(now);
        self.second_window.push_back(now);
    }

    fn maybe_recover(&mut self, now: Time, ceiling: &RateLimiterConfig) {
        let Some(deadline) = self.recovery_deadline else {
            return;
        };
        if now.checked_duration_since(deadline).is_none() {
            return;
        }
        let mut recovered = false;
        if self.effective_per_second < ceiling.requests_per_second {
            self.effective_per_second += 1;
            recovered = true;
        }
        if self.effective_per_minute < ceiling.requests_per_minute {
            self.effective_per_minute += 1;
            recovered = true;
        }
        if self.effective_per_second >= ceiling.requests_per_second
            && self.effective_per_minute >= ceiling.requests_per_minute
        {
            self.recovery_deadline = None;
        } else if recovered {
            self.recovery_deadline = now.checked_add(ceiling.recovery_step);
        }
    }
}

/// Component C1. Cheap to clone; clones share the same underlying admission
/// state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: RateLimiterConfig,
    state: Mutex<State>,
    time_provider: Arc<dyn TimeProvider>,
    admitted: Arc<U64Counter>,
    rate_limited_events: Arc<U64Counter>,
}

impl RateLimiter {
    pub fn new(
        config: RateLimiterConfig,
        time_provider: Arc<dyn TimeProvider>,
        metric_registry: &Registry,
    ) -> Self {
        let admitted_metric: Arc<Metric<U64Counter>> =
            metric_registry.register_metric("rate_limiter_admitted", "requests admitted");
        let rate_limited_metric: Arc<Metric<U64Counter>> = metric_registry
            .register_metric("rate_limiter_rate_limited_events", "rate-limit signals observed");

        let state = State::new(&config);
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(state),
                time_provider,
                admitted: admitted_metric.recorder(&[]),
                rate_limited_events: rate_limited_metric.recorder(&[]),
            }),
        }
    }

    /// Blocks until issuing one request is admissible, or returns
    /// [`Cancelled`] if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            let now = self.inner.time_provider.now();
            let wait_until = {
                let mut state = self.inner.state.lock();
                state.prune(now);
                state.maybe_recover(now, &self.inner.config);
                match state.next_admissible(now) {
                    None => {
                        state.record_admission(now);
                        None
                    }
                    Some(t) => Some(t),
                }
            };

            let Some(wait_until) = wait_until else {
                self.inner.admitted.inc(1);
                return Ok(());
            };

            let sleep_for = wait_until
                .checked_duration_since(now)
                .unwrap_or(Duration::ZERO);
            debug!(sleep_secs = sleep_for.as_secs_f64(), "rate limiter waiting");

            tokio::select! {
                _ = self.inner.time_provider.sleep(sleep_for) => {}
                _ = cancel.cancelled() => return Err(Cancelled),
            }
        }
    }

    /// Halves the effective admission rate (floor of 1/s) and starts a
    /// recovery timer.
    pub fn report_rate_limited(&self) {
        let now = self.inner.time_provider.now();
        let mut state = self.inner.state.lock();
        state.effective_per_second = (state.effective_per_second / 2).max(1);
        state.effective_per_minute = (state.effective_per_minute / 2).max(1);
        state.recovery_deadline = now.checked_add(self.inner.config.recovery_step);
        drop(state);
        self.inner.rate_limited_events.inc(1);
        warn!("rate limit signal observed, halving admission rate");
    }

    /// Contributes to recovery accounting. Recovery itself happens lazily
    /// the next time `acquire` runs, driven by the wall clock rather than
    /// by success count, so this is a no-op placeholder for callers that
    /// want to report successes explicitly.
    pub fn report_success(&self) {}

    pub fn effective_caps(&self) -> (u32, u32) {
        let state = self.inner.state.lock();
        (state.effective_per_minute, state.effective_per_second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lv_metric::Registry;
    use lv_time::MockProvider;

    fn limiter(config: RateLimiterConfig) -> (RateLimiter, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider::new(Time::from_timestamp_nanos(0)));
        let registry = Registry::new();
        let limiter = RateLimiter::new(config, provider.clone(), &registry);
        (limiter, provider)
    }

    #[tokio::test]
    async fn admits_up_to_per_second_cap_immediately() {
        let (limiter, _provider) = limiter(RateLimiterConfig {
            requests_per_minute: 1_000,
            requests_per_second: 3,
            recovery_step: Duration::from_secs(1),
        });
        let cancel = CancellationToken::new();
        for _ in 0..3 {
            limiter.acquire(&cancel).await.unwrap();
        }
        assert_eq!(limiter.effective_caps().1, 3);
    }

    #[tokio::test]
    async fn report_rate_limited_halves_caps() {
        let (limiter, _provider) = limiter(RateLimiterConfig {
            requests_per_minute: 100,
            requests_per_second: 10,
            recovery_step: Duration::from_secs(1),
        });
        limiter.report_rate_limited();
        let (per_minute, per_second) = limiter.effective_caps();
        assert_eq!(per_minute, 50);
        assert_eq!(per_second, 5);
    }

    #[tokio::test]
    async fn halving_floors_at_one_per_second() {
        let (limiter, _provider) = limiter(RateLimiterConfig {
            requests_per_minute: 4,
            requests_per_second: 1,
            recovery_step: Duration::from_secs(1),
        });
        limiter.report_rate_limited();
        assert_eq!(limiter.effective_caps().1, 1);
    }

    #[tokio::test]
    async fn acquire_is_cancellable() {
        let (limiter, _provider) = limiter(RateLimiterConfig {
            requests_per_minute: 1,
            requests_per_second: 1,
            recovery_step: Duration::from_secs(1),
        });
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();
        cancel.cancel();
        // Second acquire would normally block until the window clears;
        // cancellation must short-circuit it instead of hanging.
        let result = limiter.acquire(&cancel).await;
        assert!(result.is_err());
    }
}
