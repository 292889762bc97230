//! Install and activate hooks: cache generation management.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use super::OfflineWorker;
use crate::http::{Method, Request};

/// What `on_install` managed to cache.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
  pub generation: String,
  pub cached: Vec<String>,
  pub failed: Vec<PrecacheFailure>,
  /// The worker asks to activate without waiting for old clients to close
  pub skip_waiting: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrecacheFailure {
  pub path: String,
  pub error: String,
}

/// What `on_activate` cleaned up.
#[derive(Debug, Clone, Serialize)]
pub struct ActivateReport {
  pub generation: String,
  /// Stale generations that were removed
  pub deleted: Vec<String>,
  /// Client windows taken over by this version
  pub claimed: usize,
}

impl OfflineWorker {
  /// Populate the current generation with the app shell.
  ///
  /// Each baseline resource is fetched and stored independently; failures are
  /// logged and reported but never fail the install. Only failing to open the
  /// generation is fatal.
  pub async fn on_install(&self) -> Result<InstallReport> {
    let generation = self.config.cache_name.clone();
    self.store.open(&generation).await?;

    let attempts = self
      .config
      .precache
      .iter()
      .map(|path| self.precache_one(&generation, path));
    let results = join_all(attempts).await;

    let mut cached = Vec::new();
    let mut failed = Vec::new();
    for (path, result) in self.config.precache.iter().zip(results) {
      match result {
        Ok(()) => cached.push(path.clone()),
        Err(e) => {
          warn!(path = %path, error = %e, "Failed to precache resource");
          failed.push(PrecacheFailure {
            path: path.clone(),
            error: e.to_string(),
          });
        }
      }
    }

    self.request_skip_waiting();
    info!(
      generation = %generation,
      cached = cached.len(),
      failed = failed.len(),
      "Installed cache generation"
    );

    Ok(InstallReport {
      generation,
      cached,
      failed,
      skip_waiting: true,
    })
  }

  async fn precache_one(&self, generation: &str, path: &str) -> Result<()> {
    let request = Request::new(Method::GET, self.scope.resolve(path)?);
    let response = self.fetcher.fetch(&request).await?;
    if !response.is_ok() {
      return Err(eyre!("Unexpected status {} for {}", response.status, request.url));
    }
    self.store.put(generation, &request, &response).await
  }

  /// Delete every generation but the current one, then claim open clients.
  ///
  /// Cleanup errors propagate: a half-cleaned store is retried on the next
  /// activation.
  pub async fn on_activate(&self) -> Result<ActivateReport> {
    let current = self.config.cache_name.clone();

    let mut deleted = Vec::new();
    for name in self.store.generation_names().await? {
      if name == current {
        continue;
      }
      self.store.delete_generation(&name).await?;
      info!(generation = %name, "Deleted stale cache generation");
      deleted.push(name);
    }

    let claimed = self.clients.claim().await?;
    info!(generation = %current, claimed, "Activated");

    Ok(ActivateReport {
      generation: current,
      deleted,
      claimed,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::super::testing::{failing_harness, harness, FakeFetcher};
  use crate::cache::{CacheStore, MatchOptions};
  use crate::host::ClientWindows;
  use crate::http::{Request, Response};

  #[tokio::test]
  async fn test_install_survives_individual_failures() {
    let fetcher = FakeFetcher::new()
      .respond("/", Response::new(200, "home"))
      .respond("/index.html", Response::new(200, "home"))
      .respond("/offline.html", Response::new(200, "offline"))
      .respond("/manifest.json", Response::new(404, "missing"))
      .respond("/css/style.css", Response::new(200, "body{}"))
      .respond("/icons/icon-192x192.png", Response::new(200, "png"))
      .respond("/icons/icon-512x512.png", Response::new(200, "png"));
    // /js/main.js has no route and fails at the network level
    let h = harness(fetcher);

    let report = h.worker.on_install().await.unwrap();

    assert!(report.skip_waiting);
    assert!(h.worker.skip_waiting_requested());
    assert_eq!(report.cached.len(), 6);
    let failed: Vec<&str> = report.failed.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.contains(&"/manifest.json"));
    assert!(failed.contains(&"/js/main.js"));

    let css = Request::get(&h.url("/css/style.css")).unwrap();
    let hit = h
      .store
      .match_entry("test-v2", &css, MatchOptions::exact())
      .await
      .unwrap();
    assert_eq!(hit.unwrap().response.text(), "body{}");

    let js = Request::get(&h.url("/js/main.js")).unwrap();
    let miss = h
      .store
      .match_entry("test-v2", &js, MatchOptions::exact())
      .await
      .unwrap();
    assert!(miss.is_none());
  }

  #[tokio::test]
  async fn test_install_with_network_down_still_completes() {
    let h = harness(FakeFetcher::new().offline());

    let report = h.worker.on_install().await.unwrap();

    assert!(report.cached.is_empty());
    assert_eq!(report.failed.len(), h.worker.config.precache.len());
    assert!(report.skip_waiting);
    assert_eq!(h.store.generation_names().await.unwrap(), vec!["test-v2"]);
  }

  #[tokio::test]
  async fn test_activate_leaves_only_current_generation() {
    let h = harness(FakeFetcher::new());
    let request = Request::get(&h.url("/")).unwrap();
    for old in ["test-v0", "test-v1", "unrelated"] {
      h.store
        .put(old, &request, &Response::new(200, old))
        .await
        .unwrap();
    }
    h.store.open("test-v2").await.unwrap();
    h.windows.attach(&h.url("/")).unwrap();

    let report = h.worker.on_activate().await.unwrap();

    assert_eq!(report.deleted, vec!["test-v0", "test-v1", "unrelated"]);
    assert_eq!(report.claimed, 1);
    assert_eq!(h.store.generation_names().await.unwrap(), vec!["test-v2"]);
  }

  #[tokio::test]
  async fn test_install_survives_store_write_failures() {
    let fetcher = FakeFetcher::new()
      .respond("/", Response::new(200, "home"))
      .respond("/css/style.css", Response::new(200, "body{}"));
    let (h, store) = failing_harness(fetcher);
    store.fail_put(true);

    let report = h.worker.on_install().await.unwrap();

    assert!(report.cached.is_empty());
    assert_eq!(report.failed.len(), h.worker.config.precache.len());
    assert!(report
      .failed
      .iter()
      .any(|f| f.path == "/css/style.css" && f.error.contains("write cache entry")));
    assert!(report.skip_waiting);
    assert!(h.worker.skip_waiting_requested());
  }

  #[tokio::test]
  async fn test_activate_fails_before_claiming_when_cleanup_fails() {
    let (h, store) = failing_harness(FakeFetcher::new());
    let request = Request::get(&h.url("/")).unwrap();
    h.store
      .put("test-v1", &request, &Response::new(200, "old"))
      .await
      .unwrap();
    h.store.open("test-v2").await.unwrap();
    h.windows.attach(&h.url("/")).unwrap();

    store.fail_listing(true);
    assert!(h.worker.on_activate().await.is_err());

    store.fail_listing(false);
    store.fail_delete(true);
    assert!(h.worker.on_activate().await.is_err());

    let windows = h.windows.windows().await.unwrap();
    assert!(windows.iter().all(|w| !w.controlled));
    assert_eq!(
      h.store.generation_names().await.unwrap(),
      vec!["test-v1", "test-v2"]
    );

    // A later activation finishes the job
    store.fail_delete(false);
    let report = h.worker.on_activate().await.unwrap();
    assert_eq!(report.deleted, vec!["test-v1"]);
    assert_eq!(report.claimed, 1);
  }
}
