//! SQLite implementation of the cache store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use url::Url;

use super::traits::{request_key, CacheStore, CachedResponse, MatchOptions};
use crate::http::{Method, Request, Response};

/// SQLite-based cache store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a store that lives only in memory.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;
    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Named cache generations
CREATE TABLE IF NOT EXISTS cache_generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by request identity
CREATE TABLE IF NOT EXISTS cache_entries (
    generation TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    url_no_query TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_key),
    FOREIGN KEY (generation) REFERENCES cache_generations(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_no_query
    ON cache_entries(generation, method, url_no_query);
"#;

const ENTRY_COLUMNS: &str = "status, status_text, headers, body, cached_at";

type EntryRow = (u16, String, String, Vec<u8>, String);

fn read_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
  Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_cached(row: EntryRow) -> Result<CachedResponse> {
  let (status, status_text, headers, body, cached_at) = row;
  let headers: Vec<(String, String)> = serde_json::from_str(&headers)
    .map_err(|e| eyre!("Failed to deserialize cached headers: {}", e))?;

  Ok(CachedResponse {
    response: Response {
      status,
      status_text,
      headers,
      body,
    },
    cached_at: parse_datetime(&cached_at)?,
  })
}

fn ensure_generation(conn: &Connection, generation: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_generations (name) VALUES (?)",
      params![generation],
    )
    .map_err(|e| eyre!("Failed to create cache generation {}: {}", generation, e))?;
  Ok(())
}

#[async_trait]
impl CacheStore for SqliteStore {
  async fn open(&self, generation: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_generation(&conn, generation)
  }

  async fn match_entry(
    &self,
    generation: &str,
    request: &Request,
    options: MatchOptions,
  ) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let result = if options.ignore_search {
      // Exact URL first, then the latest write among query variants
      conn
        .query_row(
          &format!(
            "SELECT {} FROM cache_entries
             WHERE generation = ? AND method = ? AND url_no_query = ?
             ORDER BY (url = ?) DESC, rowid DESC
             LIMIT 1",
            ENTRY_COLUMNS
          ),
          params![
            generation,
            request.method.as_str(),
            request.url_without_query(),
            request.url.as_str()
          ],
          read_entry_row,
        )
        .optional()
    } else {
      conn
        .query_row(
          &format!(
            "SELECT {} FROM cache_entries WHERE generation = ? AND request_key = ?",
            ENTRY_COLUMNS
          ),
          params![generation, request_key(request)],
          read_entry_row,
        )
        .optional()
    };
    let row = result.map_err(|e| eyre!("Failed to query cache entry: {}", e))?;

    row.map(into_cached).transpose()
  }

  async fn put(&self, generation: &str, request: &Request, response: &Response) -> Result<()> {
    let conn = self.lock()?;
    ensure_generation(&conn, generation)?;

    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries
           (generation, request_key, method, url, url_no_query, status, status_text, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          generation,
          request_key(request),
          request.method.as_str(),
          request.url.as_str(),
          request.url_without_query(),
          response.status,
          response.status_text,
          headers,
          response.body,
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry for {}: {}", request.url, e))?;

    Ok(())
  }

  async fn delete_entry(&self, generation: &str, request: &Request) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn
      .execute(
        "DELETE FROM cache_entries WHERE generation = ? AND request_key = ?",
        params![generation, request_key(request)],
      )
      .map_err(|e| eyre!("Failed to delete cache entry: {}", e))?;
    Ok(removed > 0)
  }

  async fn keys(&self, generation: &str) -> Result<Vec<Request>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT method, url FROM cache_entries WHERE generation = ? ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(String, String)> = stmt
      .query_map(params![generation], |row| Ok((row.get(0)?, row.get(1)?)))
      .map_err(|e| eyre!("Failed to list cache entries: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read cache entry: {}", e))?;

    // Rows that no longer parse are skipped rather than failing the listing
    Ok(
      rows
        .into_iter()
        .filter_map(|(method, url)| {
          let method = Method::from_bytes(method.as_bytes()).ok()?;
          let url = Url::parse(&url).ok()?;
          Some(Request::new(method, url))
        })
        .collect(),
    )
  }

  async fn clear_entries(&self, generation: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "DELETE FROM cache_entries WHERE generation = ?",
        params![generation],
      )
      .map_err(|e| eyre!("Failed to clear cache generation {}: {}", generation, e))?;
    Ok(())
  }

  async fn generation_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_generations ORDER BY created_at, rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list cache generations: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache generation name: {}", e))?;

    Ok(names)
  }

  async fn delete_generation(&self, generation: &str) -> Result<bool> {
    let conn = self.lock()?;
    conn
      .execute(
        "DELETE FROM cache_entries WHERE generation = ?",
        params![generation],
      )
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", generation, e))?;
    let removed = conn
      .execute(
        "DELETE FROM cache_generations WHERE name = ?",
        params![generation],
      )
      .map_err(|e| eyre!("Failed to delete cache generation {}: {}", generation, e))?;
    Ok(removed > 0)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
