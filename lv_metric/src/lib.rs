//! Minimal metrics registry used by the extraction and restoration
//! orchestrators to report throughput, retries and rate-limit pressure.
//!
//! Mirrors the call shape used throughout the workspace:
//! `registry.register_metric(name, description).recorder(&[(k, v)]).inc(n)`.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A set of key/value labels attached to a recorder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn from(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct U64Counter(AtomicU64);

impl U64Counter {
    pub fn inc(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn fetch(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge that can move in either direction.
#[derive(Debug, Default)]
pub struct U64Gauge(AtomicU64);

impl U64Gauge {
    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn inc(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn dec(&self, delta: u64) {
        self.0.fetch_sub(delta, Ordering::Relaxed);
    }

    pub fn fetch(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A named, described metric family. Calling `recorder` with a distinct set
/// of [`Attributes`] returns (creating on first use) the counter/gauge for
/// that label combination.
#[derive(Debug)]
pub struct Metric<T> {
    name: &'static str,
    recorders: Mutex<BTreeMap<Attributes, Arc<T>>>,
}

impl<T: Default> Metric<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            recorders: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn recorder(&self, attributes: &[(&str, &str)]) -> Arc<T> {
        let attributes = Attributes::from(attributes);
        self.recorders
            .lock()
            .entry(attributes)
            .or_insert_with(|| Arc::new(T::default()))
            .clone()
    }
}

/// Process-wide metric registry. Cheap to clone; all clones share state.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    inner: Arc<Mutex<BTreeMap<&'static str, Arc<dyn Any + Send + Sync>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or retrieves, if already registered) a metric family
    /// under `name`. Panics if `name` was already registered with a
    /// different instrument type, mirroring a programmer error rather than
    /// a runtime condition.
    pub fn register_metric<T>(&self, name: &'static str, _description: &'static str) -> Arc<Metric<T>>
    where
        T: Default + Debug + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let entry = inner
            .entry(name)
            .or_insert_with(|| Arc::new(Metric::<T>::new(name)) as Arc<dyn Any + Send + Sync>)
            .clone();
        entry
            .downcast::<Metric<T>>()
            .unwrap_or_else(|_| panic!("metric {name} already registered with a different type"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_increments_per_label_set() {
        let registry = Registry::new();
        let metric: Arc<Metric<U64Counter>> =
            registry.register_metric("items_processed", "items processed");

        let extract = metric.recorder(&[("content_type", "Dashboard")]);
        let restore = metric.recorder(&[("content_type", "Look")]);

        extract.inc(3);
        extract.inc(2);
        restore.inc(1);

        assert_eq!(extract.fetch(), 5);
        assert_eq!(restore.fetch(), 1);
    }

    #[test]
    fn recorder_is_stable_across_calls() {
        let registry = Registry::new();
        let metric: Arc<Metric<U64Counter>> = registry.register_metric("retries", "retries");
        let a = metric.recorder(&[("worker", "0")]);
        let b = metric.recorder(&[("worker", "0")]);
        a.inc(1);
        assert_eq!(b.fetch(), 1);
    }

    #[test]
    fn repeated_registration_returns_same_family() {
        let registry = Registry::new();
        let a: Arc<Metric<U64Counter>> = registry.register_metric("x", "x");
        let b: Arc<Metric<U64Counter>> = registry.register_metric("x", "x");
        a.recorder(&[]).inc(7);
        assert_eq!(b.recorder(&[]).fetch(), 7);
    }
}
