//! Time abstraction used throughout LookerVault so that rate limiting,
//! checkpoint ages and retry backoff can be tested deterministically.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

/// A point in time, represented as nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(i64);

impl Time {
    pub fn from_timestamp_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn from_datetime(t: DateTime<Utc>) -> Self {
        Self(t.timestamp_nanos_opt().unwrap_or(i64::MAX))
    }

    pub fn timestamp_nanos(&self) -> i64 {
        self.0
    }

    pub fn date_time(&self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.0)
    }

    /// Duration elapsed from `self` to `other`, or `None` if `other` is
    /// earlier than `self`.
    pub fn checked_duration_since(&self, other: Self) -> Option<Duration> {
        if other.0 > self.0 {
            return None;
        }
        Some(Duration::from_nanos((self.0 - other.0) as u64))
    }

    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        let nanos = duration.as_nanos();
        let nanos: i64 = nanos.try_into().ok()?;
        self.0.checked_add(nanos).map(Self)
    }
}

/// Abstraction over wall-clock time so tests can inject synthetic clocks.
pub trait TimeProvider: Debug + Send + Sync + 'static {
    fn now(&self) -> Time;

    fn now_std(&self) -> std::time::SystemTime {
        std::time::UNIX_EPOCH + Duration::from_nanos(self.now().timestamp_nanos().max(0) as u64)
    }

    /// Sleeps until `duration` has passed, relative to `self.now()`.
    fn sleep<'a>(
        &'a self,
        duration: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>>;
}

/// Real wall-clock time via the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProvider {}

impl SystemProvider {
    pub fn new() -> Self {
        Self {}
    }
}

impl TimeProvider for SystemProvider {
    fn now(&self) -> Time {
        Time::from_datetime(Utc::now())
    }

    fn sleep<'a>(
        &'a self,
        duration: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// A controllable clock for tests. `now()` only advances when `inc` or
/// `set` is called.
#[derive(Debug)]
pub struct MockProvider {
    now: Mutex<Time>,
}

impl MockProvider {
    pub fn new(start: Time) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, t: Time) {
        *self.now.lock() = t;
    }

    pub fn inc(&self, duration: Duration) -> Time {
        let mut guard = self.now.lock();
        let next = guard.checked_add(duration).expect("time overflow");
        *guard = next;
        next
    }
}

impl TimeProvider for MockProvider {
    fn now(&self) -> Time {
        *self.now.lock()
    }

    fn sleep<'a>(
        &'a self,
        _duration: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        // Tests advance the mock clock explicitly; sleeping resolves
        // immediately so callers aren't blocked on real time.
        Box::pin(async move {})
    }
}

/// Convenience constructor used by call sites that just want a shared,
/// ref-counted real clock.
pub fn system_provider() -> Arc<dyn TimeProvider> {
    Arc::new(SystemProvider::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_provider_advances_on_inc() {
        let start = Time::from_timestamp_nanos(0);
        let provider = MockProvider::new(start);
        assert_eq!(provider.now(), start);

        let next = provider.inc(Duration::from_secs(5));
        assert_eq!(next, provider.now());
        assert_eq!(
            provider.now().checked_duration_since(start),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn checked_duration_since_is_none_when_negative() {
        let earlier = Time::from_timestamp_nanos(0);
        let later = Time::from_timestamp_nanos(10);
        assert!(earlier.checked_duration_since(later).is_none());
        assert_eq!(
            later.checked_duration_since(earlier),
            Some(Duration::from_nanos(10))
        );
    }
}
