//! Process-local cache store.

use async_trait::async_trait;
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use super::traits::{request_key, CacheStore, CachedResponse, MatchOptions};
use crate::http::{Request, Response};

struct StoredEntry {
  request: Request,
  url_no_query: String,
  cached: CachedResponse,
  /// Write sequence, used to find the latest entry among query variants
  seq: u64,
}

#[derive(Default)]
struct Generation {
  entries: HashMap<String, StoredEntry>,
}

#[derive(Default)]
struct State {
  /// Kept in creation order
  generations: Vec<(String, Generation)>,
  next_seq: u64,
}

impl State {
  fn generation(&self, name: &str) -> Option<&Generation> {
    self
      .generations
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, g)| g)
  }

  fn generation_mut(&mut self, name: &str) -> &mut Generation {
    let index = match self.generations.iter().position(|(n, _)| n == name) {
      Some(index) => index,
      None => {
        self.generations.push((name.to_string(), Generation::default()));
        self.generations.len() - 1
      }
    };
    &mut self.generations[index].1
  }
}

/// Cache store that lives only as long as the process.
///
/// Used for `--ephemeral` runs and in tests.
#[derive(Default)]
pub struct MemoryStore {
  state: Mutex<State>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
    self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

#[async_trait]
impl CacheStore for MemoryStore {
  async fn open(&self, generation: &str) -> Result<()> {
    self.lock()?.generation_mut(generation);
    Ok(())
  }

  async fn match_entry(
    &self,
    generation: &str,
    request: &Request,
    options: MatchOptions,
  ) -> Result<Option<CachedResponse>> {
    let state = self.lock()?;
    let Some(generation) = state.generation(generation) else {
      return Ok(None);
    };

    if let Some(entry) = generation.entries.get(&request_key(request)) {
      return Ok(Some(entry.cached.clone()));
    }
    if !options.ignore_search {
      return Ok(None);
    }

    let url_no_query = request.url_without_query();
    Ok(
      generation
        .entries
        .values()
        .filter(|e| e.request.method == request.method && e.url_no_query == url_no_query)
        .max_by_key(|e| e.seq)
        .map(|e| e.cached.clone()),
    )
  }

  async fn put(&self, generation: &str, request: &Request, response: &Response) -> Result<()> {
    let mut state = self.lock()?;
    let seq = state.next_seq;
    state.next_seq += 1;

    let entry = StoredEntry {
      request: request.clone(),
      url_no_query: request.url_without_query(),
      cached: CachedResponse {
        response: response.clone(),
        cached_at: Utc::now(),
      },
      seq,
    };
    state
      .generation_mut(generation)
      .entries
      .insert(request_key(request), entry);
    Ok(())
  }

  async fn delete_entry(&self, generation: &str, request: &Request) -> Result<bool> {
    let mut state = self.lock()?;
    let key = request_key(request);
    Ok(
      state
        .generations
        .iter_mut()
        .find(|(n, _)| n == generation)
        .map(|(_, g)| g.entries.remove(&key).is_some())
        .unwrap_or(false),
    )
  }

  async fn keys(&self, generation: &str) -> Result<Vec<Request>> {
    let state = self.lock()?;
    let mut entries: Vec<&StoredEntry> = state
      .generation(generation)
      .map(|g| g.entries.values().collect())
      .unwrap_or_default();
    entries.sort_by_key(|e| e.seq);
    Ok(entries.into_iter().map(|e| e.request.clone()).collect())
  }

  async fn clear_entries(&self, generation: &str) -> Result<()> {
    let mut state = self.lock()?;
    if let Some((_, g)) = state.generations.iter_mut().find(|(n, _)| n == generation) {
      g.entries.clear();
    }
    Ok(())
  }

  async fn generation_names(&self) -> Result<Vec<String>> {
    let state = self.lock()?;
    Ok(state.generations.iter().map(|(n, _)| n.clone()).collect())
  }

  async fn delete_generation(&self, generation: &str) -> Result<bool> {
    let mut state = self.lock()?;
    let before = state.generations.len();
    state.generations.retain(|(n, _)| n != generation);
    Ok(state.generations.len() != before)
  }
}
