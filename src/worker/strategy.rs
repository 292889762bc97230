//! Fetch interception: one caching strategy per request class.

use color_eyre::Result;
use serde::Serialize;
use tracing::{debug, warn};

use super::classify::{classify, RequestClass};
use super::OfflineWorker;
use crate::cache::{CachedResponse, MatchOptions};
use crate::http::{Method, Request, Response};

/// Where the response handed back to the client came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServedFrom {
  /// Live network response
  Network,
  /// Cached copy of the request (or of its query-less variant)
  Cache,
  /// The offline document, cached or built in
  OfflineDocument,
  /// Response built by the worker itself (error bodies, empty failures)
  Synthetic,
}

/// The response for an intercepted request.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
  pub class: RequestClass,
  pub response: Response,
  pub source: ServedFrom,
}

type Served = (Response, ServedFrom);

impl OfflineWorker {
  /// Answer an outbound request.
  ///
  /// Returns `Ok(None)` when the request is not intercepted and should go to
  /// the network untouched. Every intercepted request gets a response, with
  /// one exception: a `Default` request whose network fetch fails and which
  /// has no cached copy reports the network error.
  pub async fn handle_fetch(&self, request: &Request) -> Result<Option<FetchOutcome>> {
    let Some(class) = classify(request, &self.scope) else {
      debug!(method = %request.method, url = %request.url, "Passing request through");
      return Ok(None);
    };

    let (response, source) = match class {
      RequestClass::CrossOrigin => self.cache_first(request).await,
      RequestClass::NeverCache => self.network_only(request).await,
      RequestClass::Document => self.network_first_document(request).await,
      RequestClass::StaticAsset => self.stale_while_revalidate(request).await,
      RequestClass::Default => self.network_first(request).await?,
    };

    debug!(
      url = %request.url,
      ?class,
      ?source,
      status = response.status,
      "Served request"
    );
    Ok(Some(FetchOutcome {
      class,
      response,
      source,
    }))
  }

  /// Cache first; only allow-listed hosts are written back.
  async fn cache_first(&self, request: &Request) -> Served {
    if let Some(hit) = self.lookup(request, MatchOptions::exact()).await {
      return (hit.response, ServedFrom::Cache);
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.is_ok() && self.is_allowed_cross_origin(request) {
          self.store_copy(request, &response).await;
        }
        (response, ServedFrom::Network)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Cross-origin fetch failed");
        (Response::failure(), ServedFrom::Synthetic)
      }
    }
  }

  /// Network only; never reads or writes the cache.
  async fn network_only(&self, request: &Request) -> Served {
    match self.fetcher.fetch(request).await {
      Ok(response) => (response, ServedFrom::Network),
      Err(e) => {
        warn!(url = %request.url, error = %e, "Live request failed while offline");
        if request.accepts_html() {
          self.offline_document().await
        } else {
          (Response::offline_json(), ServedFrom::Synthetic)
        }
      }
    }
  }

  /// Network first with cache refresh; falls back to cache, then the offline document.
  ///
  /// An error status counts as a failure too, but when nothing cached can
  /// stand in for it the server's own response is returned.
  async fn network_first_document(&self, request: &Request) -> Served {
    let rejected = match self.fetcher.fetch(request).await {
      Ok(response) if response.is_ok() => {
        self.store_copy(request, &response).await;
        return (response, ServedFrom::Network);
      }
      Ok(response) => {
        debug!(
          url = %request.url,
          status = response.status,
          "Document fetch returned an error status, trying cache"
        );
        Some(response)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Document fetch failed, trying cache");
        None
      }
    };

    if let Some(hit) = self.lookup(request, MatchOptions::exact()).await {
      return (hit.response, ServedFrom::Cache);
    }
    if let Some(index) = directory_index(request) {
      if let Some(hit) = self.lookup(&index, MatchOptions::exact()).await {
        return (hit.response, ServedFrom::Cache);
      }
    }

    match rejected {
      Some(response) => match self.cached_offline_document().await {
        Some(hit) => (hit.response, ServedFrom::OfflineDocument),
        None => (response, ServedFrom::Network),
      },
      None => self.offline_document().await,
    }
  }

  /// Serve the cached copy at once and refresh it in the background.
  async fn stale_while_revalidate(&self, request: &Request) -> Served {
    if let Some(hit) = self.lookup(request, MatchOptions::ignore_search()).await {
      self.spawn_revalidate(request.clone());
      return (hit.response, ServedFrom::Cache);
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.is_ok() {
          self.store_copy(request, &response).await;
        }
        (response, ServedFrom::Network)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Asset fetch failed with nothing cached");
        (Response::failure(), ServedFrom::Synthetic)
      }
    }
  }

  /// Fire-and-forget refresh of a cached asset.
  ///
  /// The task is not awaited and its failures are dropped. A request racing
  /// with it may see either the old or the new entry.
  fn spawn_revalidate(&self, request: Request) {
    let worker = self.clone();
    tokio::spawn(async move {
      match worker.fetcher.fetch(&request).await {
        Ok(response) if response.is_ok() => worker.store_copy(&request, &response).await,
        Ok(response) => {
          debug!(url = %request.url, status = response.status, "Revalidation not stored");
        }
        Err(e) => {
          debug!(url = %request.url, error = %e, "Revalidation failed");
        }
      }
    });
  }

  /// Network first with best-effort caching. Error statuses fall back to the
  /// cached copy when there is one; a failed fetch with nothing cached
  /// surfaces the network error.
  async fn network_first(&self, request: &Request) -> Result<Served> {
    match self.fetcher.fetch(request).await {
      Ok(response) if response.is_ok() => {
        self.store_copy(request, &response).await;
        Ok((response, ServedFrom::Network))
      }
      Ok(response) => match self.lookup(request, MatchOptions::exact()).await {
        Some(hit) => Ok((hit.response, ServedFrom::Cache)),
        None => Ok((response, ServedFrom::Network)),
      },
      Err(e) => match self.lookup(request, MatchOptions::exact()).await {
        Some(hit) => Ok((hit.response, ServedFrom::Cache)),
        None => Err(e),
      },
    }
  }

  /// The cached offline document, or a built-in page when it was never cached.
  async fn offline_document(&self) -> Served {
    match self.cached_offline_document().await {
      Some(hit) => (hit.response, ServedFrom::OfflineDocument),
      None => (
        Response::offline_page(&self.config.app_name),
        ServedFrom::OfflineDocument,
      ),
    }
  }

  async fn cached_offline_document(&self) -> Option<CachedResponse> {
    match self.scope.resolve(&self.config.offline_document) {
      Ok(url) => {
        self
          .lookup(&Request::new(Method::GET, url), MatchOptions::exact())
          .await
      }
      Err(e) => {
        warn!(error = %e, "Offline document path is invalid");
        None
      }
    }
  }

  /// Look a request up in any generation. Store errors count as a miss.
  async fn lookup(&self, request: &Request, options: MatchOptions) -> Option<CachedResponse> {
    match self.store.match_any(request, options).await {
      Ok(Some(hit)) => {
        debug!(url = %request.url, cached_at = %hit.cached_at, "Cache hit");
        Some(hit)
      }
      Ok(None) => None,
      Err(e) => {
        warn!(url = %request.url, error = %e, "Cache lookup failed");
        None
      }
    }
  }

  /// Write a response into the current generation. Store errors are logged.
  async fn store_copy(&self, request: &Request, response: &Response) {
    if let Err(e) = self
      .store
      .put(&self.config.cache_name, request, response)
      .await
    {
      warn!(url = %request.url, error = %e, "Failed to cache response");
    }
  }

  fn is_allowed_cross_origin(&self, request: &Request) -> bool {
    request
      .url
      .host_str()
      .map(|host| {
        self
          .config
          .cross_origin_allow
          .contains(&host.to_ascii_lowercase())
      })
      .unwrap_or(false)
  }
}

/// `/dir/` → `/dir/index.html`
fn directory_index(request: &Request) -> Option<Request> {
  if !request.path().ends_with('/') {
    return None;
  }
  let url = request.url.join("index.html").ok()?;
  Some(request.redirected(url))
}
