//! Capabilities the embedding environment provides to the worker: window
//! enumeration and system notifications.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::info;

use crate::worker::NotificationOptions;

/// An open application window or tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientWindow {
  pub id: String,
  pub url: String,
  pub focused: bool,
  /// Whether the current worker version controls this window
  pub controlled: bool,
}

#[async_trait]
pub trait ClientWindows: Send + Sync {
  /// Windows currently open, in the order they were opened.
  async fn windows(&self) -> Result<Vec<ClientWindow>>;

  async fn focus(&self, id: &str) -> Result<()>;

  /// Open a new window at an absolute URL.
  async fn open(&self, url: &str) -> Result<ClientWindow>;

  /// Take control of every in-scope window. Returns how many were claimed.
  async fn claim(&self) -> Result<usize>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
  /// Display a notification. One with the same tag is replaced.
  async fn show(&self, notification: &NotificationOptions) -> Result<()>;

  /// Dismiss the visible notification with this tag, if any.
  async fn close(&self, tag: &str) -> Result<()>;
}

/// Window registry for a single host session.
#[derive(Default)]
pub struct SessionWindows {
  windows: Mutex<Vec<ClientWindow>>,
  next_id: AtomicU64,
}

impl SessionWindows {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a window that was opened outside the worker.
  #[cfg(test)]
  pub fn attach(&self, url: &str) -> Result<ClientWindow> {
    let window = ClientWindow {
      id: self.next_id(),
      url: url.to_string(),
      focused: false,
      controlled: false,
    };
    self.lock()?.push(window.clone());
    Ok(window)
  }

  fn next_id(&self) -> String {
    format!("client-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<ClientWindow>>> {
    self
      .windows
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

#[async_trait]
impl ClientWindows for SessionWindows {
  async fn windows(&self) -> Result<Vec<ClientWindow>> {
    Ok(self.lock()?.clone())
  }

  async fn focus(&self, id: &str) -> Result<()> {
    let mut windows = self.lock()?;
    if !windows.iter().any(|w| w.id == id) {
      return Err(eyre!("No client window with id {}", id));
    }
    for window in windows.iter_mut() {
      window.focused = window.id == id;
    }
    info!(client = id, "Focused client window");
    Ok(())
  }

  async fn open(&self, url: &str) -> Result<ClientWindow> {
    let window = ClientWindow {
      id: self.next_id(),
      url: url.to_string(),
      focused: true,
      controlled: true,
    };

    let mut windows = self.lock()?;
    for existing in windows.iter_mut() {
      existing.focused = false;
    }
    windows.push(window.clone());
    info!(client = %window.id, url, "Opened client window");
    Ok(window)
  }

  async fn claim(&self) -> Result<usize> {
    let mut windows = self.lock()?;
    let mut claimed = 0;
    for window in windows.iter_mut().filter(|w| !w.controlled) {
      window.controlled = true;
      claimed += 1;
    }
    Ok(claimed)
  }
}

/// Notification tray for a single host session.
///
/// Keeps at most one visible notification per tag.
#[derive(Default)]
pub struct SessionNotifier {
  visible: Mutex<Vec<NotificationOptions>>,
  alerts: AtomicUsize,
}

impl SessionNotifier {
  pub fn new() -> Self {
    Self::default()
  }

  /// Notifications currently on screen.
  pub fn visible(&self) -> Result<Vec<NotificationOptions>> {
    Ok(self.lock()?.clone())
  }

  /// How many times the user was alerted (sound/vibration).
  #[cfg(test)]
  pub fn alerts(&self) -> usize {
    self.alerts.load(Ordering::SeqCst)
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<NotificationOptions>>> {
    self
      .visible
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

#[async_trait]
impl NotificationSink for SessionNotifier {
  async fn show(&self, notification: &NotificationOptions) -> Result<()> {
    let mut visible = self.lock()?;
    let replaced = match visible.iter_mut().find(|n| n.tag == notification.tag) {
      Some(existing) => {
        *existing = notification.clone();
        true
      }
      None => {
        visible.push(notification.clone());
        false
      }
    };

    // A replacement is silent unless renotify is set
    if !replaced || notification.renotify {
      self.alerts.fetch_add(1, Ordering::SeqCst);
    }
    info!(tag = %notification.tag, replaced, "Showing notification");
    Ok(())
  }

  async fn close(&self, tag: &str) -> Result<()> {
    self.lock()?.retain(|n| n.tag != tag);
    Ok(())
  }
}
