//! Fakes for exercising the worker without a network.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

use super::OfflineWorker;
use crate::cache::{CacheStore, CachedResponse, MatchOptions, MemoryStore};
use crate::config::Config;
use crate::host::{SessionNotifier, SessionWindows};
use crate::http::{Fetcher, Request, Response};

pub const TEST_ORIGIN: &str = "https://convencao.test";

/// Fetcher answering from a fixed route table.
///
/// Unknown URLs and every request while offline fail like a dropped connection.
#[derive(Default)]
pub struct FakeFetcher {
  routes: HashMap<String, Response>,
  offline: AtomicBool,
  calls: AtomicUsize,
}

impl FakeFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  /// Route a same-origin path.
  pub fn respond(self, path: &str, response: Response) -> Self {
    self.respond_url(&format!("{}{}", TEST_ORIGIN, path), response)
  }

  pub fn respond_url(mut self, url: &str, response: Response) -> Self {
    let url = Url::parse(url).unwrap();
    self.routes.insert(url.into(), response);
    self
  }

  pub fn offline(self) -> Self {
    self.set_offline(true);
    self
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Fetcher for FakeFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("Failed to fetch {}: network unreachable", request.url));
    }

    self
      .routes
      .get(request.url.as_str())
      .or_else(|| self.routes.get(&request.url_without_query()))
      .cloned()
      .ok_or_else(|| eyre!("Failed to fetch {}: connection refused", request.url))
  }
}

/// Store that delegates to a `MemoryStore` but can be told to fail writes,
/// generation listing or generation deletion.
#[derive(Default)]
pub struct FailingStore {
  inner: Arc<MemoryStore>,
  fail_put: AtomicBool,
  fail_listing: AtomicBool,
  fail_delete: AtomicBool,
}

impl FailingStore {
  pub fn fail_put(&self, fail: bool) {
    self.fail_put.store(fail, Ordering::SeqCst);
  }

  pub fn fail_listing(&self, fail: bool) {
    self.fail_listing.store(fail, Ordering::SeqCst);
  }

  pub fn fail_delete(&self, fail: bool) {
    self.fail_delete.store(fail, Ordering::SeqCst);
  }

  fn check(flag: &AtomicBool, operation: &str) -> Result<()> {
    if flag.load(Ordering::SeqCst) {
      return Err(eyre!("Failed to {}: disk I/O error", operation));
    }
    Ok(())
  }
}

#[async_trait]
impl CacheStore for FailingStore {
  async fn open(&self, generation: &str) -> Result<()> {
    self.inner.open(generation).await
  }

  async fn match_entry(
    &self,
    generation: &str,
    request: &Request,
    options: MatchOptions,
  ) -> Result<Option<CachedResponse>> {
    self.inner.match_entry(generation, request, options).await
  }

  async fn put(&self, generation: &str, request: &Request, response: &Response) -> Result<()> {
    Self::check(&self.fail_put, "write cache entry")?;
    self.inner.put(generation, request, response).await
  }

  async fn delete_entry(&self, generation: &str, request: &Request) -> Result<bool> {
    self.inner.delete_entry(generation, request).await
  }

  async fn keys(&self, generation: &str) -> Result<Vec<Request>> {
    self.inner.keys(generation).await
  }

  async fn clear_entries(&self, generation: &str) -> Result<()> {
    self.inner.clear_entries(generation).await
  }

  async fn generation_names(&self) -> Result<Vec<String>> {
    Self::check(&self.fail_listing, "list cache generations")?;
    self.inner.generation_names().await
  }

  async fn delete_generation(&self, generation: &str) -> Result<bool> {
    Self::check(&self.fail_delete, "delete cache generation")?;
    self.inner.delete_generation(generation).await
  }
}

pub struct Harness {
  pub worker: OfflineWorker,
  pub fetcher: Arc<FakeFetcher>,
  pub store: Arc<MemoryStore>,
  pub windows: Arc<SessionWindows>,
  pub notifier: Arc<SessionNotifier>,
}

impl Harness {
  pub fn url(&self, path: &str) -> String {
    self.scope_url(path).into()
  }

  pub fn scope_url(&self, path: &str) -> Url {
    Url::parse(TEST_ORIGIN).unwrap().join(path).unwrap()
  }
}

pub fn test_config() -> Config {
  Config {
    origin: TEST_ORIGIN.to_string(),
    cache_name: "test-v2".to_string(),
    ..Config::default()
  }
}

pub fn harness(fetcher: FakeFetcher) -> Harness {
  build(fetcher, None)
}

/// Harness whose worker writes through a `FailingStore`; `Harness::store`
/// is the memory store underneath it.
pub fn failing_harness(fetcher: FakeFetcher) -> (Harness, Arc<FailingStore>) {
  let failing = Arc::new(FailingStore::default());
  let h = build(fetcher, Some(failing.clone()));
  (h, failing)
}

fn build(fetcher: FakeFetcher, failing: Option<Arc<FailingStore>>) -> Harness {
  let fetcher = Arc::new(fetcher);
  let store = failing
    .as_ref()
    .map(|f| f.inner.clone())
    .unwrap_or_default();
  let worker_store: Arc<dyn CacheStore> = match failing {
    Some(failing) => failing,
    None => store.clone(),
  };
  let windows = Arc::new(SessionWindows::new());
  let notifier = Arc::new(SessionNotifier::new());

  let worker = OfflineWorker::new(
    test_config(),
    fetcher.clone(),
    worker_store,
    windows.clone(),
    notifier.clone(),
  )
  .unwrap();

  Harness {
    worker,
    fetcher,
    store,
    windows,
    notifier,
  }
}
