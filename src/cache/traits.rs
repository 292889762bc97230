//! Core traits and types for the durable cache store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::http::{Request, Response};

/// How a lookup compares the request URL against stored entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
  /// Compare URLs with their query strings stripped
  pub ignore_search: bool,
}

impl MatchOptions {
  pub fn exact() -> Self {
    Self::default()
  }

  pub fn ignore_search() -> Self {
    Self {
      ignore_search: true,
    }
  }
}

/// A stored response together with when it was written.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

/// Durable key-value store of response snapshots, partitioned into named
/// cache generations.
///
/// Entries are keyed by method + URL. Writes overwrite; there are no
/// multi-key transactions, so concurrent writers race with last-writer-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
  /// Open a generation, creating it if absent.
  async fn open(&self, generation: &str) -> Result<()>;

  /// Look up one request in one generation.
  ///
  /// With `ignore_search`, an entry for the exact URL is preferred; otherwise
  /// the most recently written entry with the same query-less URL wins.
  async fn match_entry(
    &self,
    generation: &str,
    request: &Request,
    options: MatchOptions,
  ) -> Result<Option<CachedResponse>>;

  /// Store a response, creating the generation if needed.
  async fn put(&self, generation: &str, request: &Request, response: &Response) -> Result<()>;

  /// Remove one entry. Returns whether it existed.
  async fn delete_entry(&self, generation: &str, request: &Request) -> Result<bool>;

  /// Requests that currently have an entry in the generation.
  async fn keys(&self, generation: &str) -> Result<Vec<Request>>;

  /// Remove every entry of a generation but keep the generation itself.
  async fn clear_entries(&self, generation: &str) -> Result<()>;

  /// Generation names in creation order.
  async fn generation_names(&self) -> Result<Vec<String>>;

  /// Remove a generation and all of its entries. Returns whether it existed.
  async fn delete_generation(&self, generation: &str) -> Result<bool>;

  /// Look the request up in every generation, oldest first.
  async fn match_any(
    &self,
    request: &Request,
    options: MatchOptions,
  ) -> Result<Option<CachedResponse>> {
    for generation in self.generation_names().await? {
      if let Some(hit) = self.match_entry(&generation, request, options).await? {
        return Ok(Some(hit));
      }
    }
    Ok(None)
  }
}

/// Stable storage key for a request identity.
pub fn request_key(request: &Request) -> String {
  use sha2::{Digest, Sha256};

  let mut hasher = Sha256::new();
  hasher.update(request.method.as_str().as_bytes());
  hasher.update(b" ");
  hasher.update(request.url.as_str().as_bytes());
  hex::encode(hasher.finalize())
}
