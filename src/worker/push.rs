//! Push messages and notification clicks.

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::OfflineWorker;
use crate::config::Config;

const OPEN_ACTION: &str = "open";
const CLOSE_ACTION: &str = "close";

/// Push payload as sent by the server. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushMessage {
  pub title: Option<String>,
  pub body: Option<String>,
  pub icon: Option<String>,
  pub tag: Option<String>,
  pub url: Option<String>,
  pub actions: Option<Vec<NotificationAction>>,
}

impl PushMessage {
  /// Decode a push payload.
  ///
  /// JSON objects are read field by field; anything else becomes the body
  /// of an otherwise default notification.
  pub fn decode(payload: Option<&[u8]>) -> Self {
    let Some(bytes) = payload.filter(|b| !b.iter().all(u8::is_ascii_whitespace)) else {
      return Self::default();
    };

    match serde_json::from_slice::<PushMessage>(bytes) {
      Ok(message) => message,
      Err(e) => {
        debug!(error = %e, "Push payload is not structured, using it as text");
        Self {
          body: Some(String::from_utf8_lossy(bytes).trim().to_string()),
          ..Self::default()
        }
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
  pub url: String,
}

/// Everything the notification display needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationOptions {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub tag: String,
  /// Re-alert the user when replacing a notification with the same tag
  pub renotify: bool,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

impl NotificationOptions {
  /// Merge a push message over the configured defaults.
  pub fn from_message(message: PushMessage, config: &Config) -> Self {
    let defaults = &config.notification;
    let actions = match message.actions {
      Some(actions) if !actions.is_empty() => actions,
      _ => default_actions(),
    };

    Self {
      title: message.title.unwrap_or_else(|| config.app_name.clone()),
      body: message.body.unwrap_or_else(|| defaults.body.clone()),
      icon: message.icon.unwrap_or_else(|| defaults.icon.clone()),
      badge: defaults.badge.clone(),
      vibrate: defaults.vibrate.clone(),
      tag: message.tag.unwrap_or_else(|| defaults.tag.clone()),
      renotify: true,
      data: NotificationData {
        url: message.url.unwrap_or_else(|| defaults.url.clone()),
      },
      actions,
    }
  }
}

fn default_actions() -> Vec<NotificationAction> {
  vec![
    NotificationAction {
      action: OPEN_ACTION.to_string(),
      title: "Abrir".to_string(),
    },
    NotificationAction {
      action: CLOSE_ACTION.to_string(),
      title: "Fechar".to_string(),
    },
  ]
}

/// A click on a displayed notification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotificationClick {
  pub tag: String,
  /// Action button pressed; `None` for a click on the notification body
  #[serde(default)]
  pub action: Option<String>,
  /// Target URL carried in the notification data
  #[serde(default)]
  pub url: Option<String>,
}

impl From<&NotificationOptions> for NotificationClick {
  fn from(notification: &NotificationOptions) -> Self {
    Self {
      tag: notification.tag.clone(),
      action: None,
      url: Some(notification.data.url.clone()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClickOutcome {
  /// The close action was pressed
  Dismissed,
  Focused { client: String },
  Opened { client: String, url: String },
}

impl OfflineWorker {
  /// Decode a push payload and display it.
  pub async fn on_push(&self, payload: Option<&[u8]>) -> Result<NotificationOptions> {
    let message = PushMessage::decode(payload);
    let notification = NotificationOptions::from_message(message, &self.config);

    self.notifier.show(&notification).await?;
    info!(tag = %notification.tag, title = %notification.title, "Displayed push notification");
    Ok(notification)
  }

  /// Close the notification, then focus a window already showing the
  /// target or open a new one.
  pub async fn on_notification_click(&self, click: &NotificationClick) -> Result<ClickOutcome> {
    self.notifier.close(&click.tag).await?;

    if click.action.as_deref() == Some(CLOSE_ACTION) {
      return Ok(ClickOutcome::Dismissed);
    }

    let target = click
      .url
      .clone()
      .unwrap_or_else(|| self.config.notification.url.clone());

    let windows = self.clients.windows().await?;
    if let Some(window) = windows.iter().find(|w| w.url.contains(&target)) {
      self.clients.focus(&window.id).await?;
      return Ok(ClickOutcome::Focused {
        client: window.id.clone(),
      });
    }

    let url = self.scope.resolve(&target)?;
    let window = self.clients.open(url.as_str()).await?;
    Ok(ClickOutcome::Opened {
      client: window.id,
      url: window.url,
    })
  }
}
