use serde::Deserialize;
use std::collections::BTreeMap;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::worker::{ControlMessage, NotificationClick};

/// One line of host input, dispatched to the matching worker hook.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
  Install,
  Activate,
  Fetch {
    url: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
  },
  Push {
    #[serde(default)]
    payload: Option<String>,
  },
  NotificationClick(NotificationClick),
  Sync {
    tag: String,
  },
  Message {
    message: ControlMessage,
  },
}

impl HostEvent {
  pub fn name(&self) -> &'static str {
    match self {
      HostEvent::Install => "install",
      HostEvent::Activate => "activate",
      HostEvent::Fetch { .. } => "fetch",
      HostEvent::Push { .. } => "push",
      HostEvent::NotificationClick(_) => "notification_click",
      HostEvent::Sync { .. } => "sync",
      HostEvent::Message { .. } => "message",
    }
  }

  /// Lifecycle events run one at a time so install settles before activate starts.
  pub fn is_lifecycle(&self) -> bool {
    matches!(self, HostEvent::Install | HostEvent::Activate)
  }
}

/// Serve loop events
#[derive(Debug)]
pub enum Event {
  /// A decoded input line, numbered from 1
  Host { id: u64, event: HostEvent },
  /// An input line that did not decode
  Invalid { id: u64, error: String },
  /// A spawned handler finished; the value is the output line
  Completed(serde_json::Value),
  /// Standard input reached EOF
  InputClosed,
}

/// Event handler that produces events from JSON lines on standard input
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    let reader_tx = tx.clone();

    // Spawn stdin reader
    tokio::spawn(async move {
      let mut lines = BufReader::new(tokio::io::stdin()).lines();
      let mut id = 0u64;
      while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
          continue;
        }
        id += 1;
        let event = match serde_json::from_str::<HostEvent>(&line) {
          Ok(event) => Event::Host { id, event },
          Err(e) => Event::Invalid {
            id,
            error: e.to_string(),
          },
        };
        if reader_tx.send(event).is_err() {
          return;
        }
      }
      let _ = reader_tx.send(Event::InputClosed);
    });

    Self { tx, rx }
  }

  /// Sender for handlers reporting back to the loop
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
