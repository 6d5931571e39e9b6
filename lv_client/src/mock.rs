//! An in-memory [`LookerClient`] double for tests, plus a generic
//! conformance suite any implementation can be run against.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lv_types::ContentType;
use parking_lot::Mutex;

use crate::{LookerClient, LookerClientError, Page, Result, Viewer};

#[derive(Debug, Default)]
struct Store {
    items: BTreeMap<(ContentType, String), serde_json::Value>,
}

/// An in-memory Looker double. `rate_limit_on_call` lets a test inject a
/// `RateLimited` failure on a specific 1-indexed call number to the whole
/// client.
#[derive(Debug)]
pub struct MockLookerClient {
    store: Mutex<Store>,
    call_count: AtomicU64,
    rate_limit_on_call: Option<u64>,
    next_id: AtomicU64,
}

impl MockLookerClient {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            call_count: AtomicU64::new(0),
            rate_limit_on_call: None,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_rate_limit_on_call(mut self, call_number: u64) -> Self {
        self.rate_limit_on_call = Some(call_number);
        self
    }

    pub fn seed(&self, content_type: ContentType, id: &str, value: serde_json::Value) {
        self.store
            .lock()
            .items
            .insert((content_type, id.to_string()), value);
    }

    pub fn len(&self, content_type: ContentType) -> usize {
        self.store
            .lock()
            .items
            .keys()
            .filter(|(ct, _)| *ct == content_type)
            .count()
    }

    pub fn is_empty(&self, content_type: ContentType) -> bool {
        self.len(content_type) == 0
    }

    fn tick(&self) -> Result<()> {
        let n = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.rate_limit_on_call == Some(n) {
            return Err(LookerClientError::rate_limited("synthetic rate limit"));
        }
        Ok(())
    }
}

impl Default for MockLookerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LookerClient for MockLookerClient {
    async fn list(
        &self,
        content_type: ContentType,
        folder_id: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<Page> {
        self.tick()?;
        let store = self.store.lock();
        let mut matching: Vec<_> = store
            .items
            .iter()
            .filter(|((ct, _), _)| *ct == content_type)
            .filter(|(_, v)| match folder_id {
                None => true,
                Some(fid) => v.get("folder_id").and_then(|f| f.as_str()) == Some(fid),
            })
            .map(|(_, v)| v.clone())
            .collect();
        matching.sort_by_key(|v| v.get("id").and_then(|i| i.as_str()).unwrap_or("").to_string());

        let start = offset.max(0) as usize;
        let end = (start + limit.max(0) as usize).min(matching.len());
        let items = if start >= matching.len() {
            Vec::new()
        } else {
            matching[start..end].to_vec()
        };
        let has_more = end < matching.len();
        Ok(Page { items, has_more })
    }

    async fn get(&self, content_type: ContentType, id: &str) -> Result<Option<serde_json::Value>> {
        self.tick()?;
        Ok(self
            .store
            .lock()
            .items
            .get(&(content_type, id.to_string()))
            .cloned())
    }

    async fn exists(&self, content_type: ContentType, id: &str) -> Result<bool> {
        self.tick()?;
        Ok(self
            .store
            .lock()
            .items
            .contains_key(&(content_type, id.to_string())))
    }

    async fn create(
        &self,
        content_type: ContentType,
        mut write_model: serde_json::Value,
    ) -> Result<String> {
        self.tick()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        if let serde_json::Value::Object(ref mut map) = write_model {
            map.insert("id".to_string(), serde_json::Value::String(id.clone()));
        }
        self.store.lock().items.insert((content_type, id.clone()), write_model);
        Ok(id)
    }

    async fn update(
        &self,
        content_type: ContentType,
        id: &str,
        write_model: serde_json::Value,
    ) -> Result<()> {
        self.tick()?;
        let mut store = self.store.lock();
        let key = (content_type, id.to_string());
        if !store.items.contains_key(&key) {
            return Err(LookerClientError::not_found(format!("{id} not found")));
        }
        store.items.insert(key, write_model);
        Ok(())
    }

    async fn me(&self) -> Result<Viewer> {
        self.tick()?;
        Ok(Viewer {
            id: "1".to_string(),
            display_name: "mock user".to_string(),
        })
    }

    async fn versions(&self) -> Result<String> {
        self.tick()?;
        Ok("24.0.0".to_string())
    }
}

/// Provides a fresh [`LookerClient`] for each generic test. Mirrors the
/// adapter/context split used throughout the workspace's own conformance
/// suites: `new_context` builds a context, and the context hands out the
/// client under test.
#[async_trait]
pub trait TestAdapter: Send + Sync {
    type Context: TestContext;

    async fn new_context(&self) -> Self::Context;

    /// Builds a context whose client fails its `call_number`th outbound
    /// call with `RateLimited`, for `test_rate_limit_signal`.
    async fn new_rate_limited_context(&self, call_number: u64) -> Self::Context;
}

#[async_trait]
pub trait TestContext: Send + Sync {
    type Client: LookerClient;

    fn client(&self) -> Arc<Self::Client>;
}

/// Runs the generic conformance suite against whatever [`LookerClient`]
/// `adapter` produces. Intended to be invoked once per concrete client
/// implementation.
pub async fn perform_generic_tests<T: TestAdapter>(adapter: T) {
    test_create_then_get(&adapter).await;
    test_update_requires_existing(&adapter).await;
    test_list_pagination(&adapter).await;
    test_rate_limit_signal(&adapter).await;
}

async fn test_create_then_get<T: TestAdapter>(adapter: &T) {
    let ctx = adapter.new_context().await;
    let client = ctx.client();
    let id = client
        .create(ContentType::Look, serde_json::json!({"title": "a look"}))
        .await
        .expect("create succeeds");
    let fetched = client
        .get(ContentType::Look, &id)
        .await
        .expect("get succeeds");
    assert!(fetched.is_some(), "created item must be retrievable");
}

async fn test_update_requires_existing<T: TestAdapter>(adapter: &T) {
    let ctx = adapter.new_context().await;
    let client = ctx.client();
    let result = client
        .update(ContentType::Look, "does-not-exist", serde_json::json!({}))
        .await;
    assert!(result.is_err(), "updating a missing item must fail");
}

async fn test_list_pagination<T: TestAdapter>(adapter: &T) {
    let ctx = adapter.new_context().await;
    let client = ctx.client();
    for i in 0..5 {
        client
            .create(ContentType::Dashboard, serde_json::json!({"title": format!("d{i}")}))
            .await
            .unwrap();
    }
    let page = client.list(ContentType::Dashboard, None, 0, 2).await.unwrap();
    assert_eq!(page.items.len(), 2);
    assert!(page.has_more);
}

async fn test_rate_limit_signal<T: TestAdapter>(adapter: &T) {
    let ctx = adapter.new_rate_limited_context(1).await;
    let client = ctx.client();
    let err = client.me().await.expect_err("first call must be rate limited");
    assert_eq!(err.kind(), crate::LookerClientErrorKind::RateLimited);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockAdapter;

    struct MockContext(Arc<MockLookerClient>);

    #[async_trait]
    impl TestAdapter for MockAdapter {
        type Context = MockContext;

        async fn new_context(&self) -> Self::Context {
            MockContext(Arc::new(MockLookerClient::new()))
        }

        async fn new_rate_limited_context(&self, call_number: u64) -> Self::Context {
            MockContext(Arc::new(MockLookerClient::new().with_rate_limit_on_call(call_number)))
        }
    }

    #[async_trait]
    impl TestContext for MockContext {
        type Client = MockLookerClient;

        fn client(&self) -> Arc<Self::Client> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn mock_passes_generic_suite() {
        perform_generic_tests(MockAdapter).await;
    }

    #[tokio::test]
    async fn rate_limit_on_call_triggers_once() {
        let client = MockLookerClient::new().with_rate_limit_on_call(2);
        client.me().await.expect("first call succeeds");
        let second = client.me().await;
        assert!(second.is_err());
        let third = client.me().await;
        assert!(third.is_ok());
    }
}
