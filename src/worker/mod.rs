//! The offline caching proxy.
//!
//! `OfflineWorker` intercepts the requests of a client application and
//! decides per request between the durable cache and the network. It is
//! constructed once with its configuration and collaborators; every
//! lifecycle hook is a method returning the work the host must wait for.

mod classify;
mod control;
mod lifecycle;
mod push;
mod strategy;

#[cfg(test)]
mod testing;

use classify::Scope;
pub use control::ControlMessage;
pub use push::{NotificationClick, NotificationOptions};

use color_eyre::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::host::{ClientWindows, NotificationSink};
use crate::http::Fetcher;

/// Offline caching proxy for one client application.
pub struct OfflineWorker {
  config: Arc<Config>,
  scope: Arc<Scope>,
  fetcher: Arc<dyn Fetcher>,
  store: Arc<dyn CacheStore>,
  clients: Arc<dyn ClientWindows>,
  notifier: Arc<dyn NotificationSink>,
  /// Set once this version asked to activate without waiting for old clients
  skip_waiting: Arc<AtomicBool>,
}

impl OfflineWorker {
  pub fn new(
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn CacheStore>,
    clients: Arc<dyn ClientWindows>,
    notifier: Arc<dyn NotificationSink>,
  ) -> Result<Self> {
    let scope = Scope::new(&config.origin, &config.never_cache)?;

    Ok(Self {
      config: Arc::new(config),
      scope: Arc::new(scope),
      fetcher,
      store,
      clients,
      notifier,
      skip_waiting: Arc::new(AtomicBool::new(false)),
    })
  }

  /// Label of the current cache generation.
  pub fn version(&self) -> &str {
    &self.config.cache_name
  }

  /// Whether this version asked to become active immediately.
  pub fn skip_waiting_requested(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  fn request_skip_waiting(&self) {
    self.skip_waiting.store(true, Ordering::SeqCst);
  }

  /// Background sync hook. Reserved; acknowledges without doing work.
  pub async fn on_sync(&self, tag: &str) -> Result<()> {
    debug!(tag, "Background sync requested");
    Ok(())
  }
}

impl Clone for OfflineWorker {
  fn clone(&self) -> Self {
    Self {
      config: Arc::clone(&self.config),
      scope: Arc::clone(&self.scope),
      fetcher: Arc::clone(&self.fetcher),
      store: Arc::clone(&self.store),
      clients: Arc::clone(&self.clients),
      notifier: Arc::clone(&self.notifier),
      skip_waiting: Arc::clone(&self.skip_waiting),
    }
  }
}
