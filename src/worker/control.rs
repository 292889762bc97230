//! Control messages sent by the controlled application.

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::OfflineWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
  /// Activate now instead of waiting for old clients to close
  SkipWaiting,
  /// Reply with the current cache generation label
  GetVersion,
  /// Delete every cache generation
  ClearCache,
}

/// Reply sent back over the message's response channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ControlReply {
  Version { version: String },
  Cleared { cleared: bool },
}

impl OfflineWorker {
  /// Handle one control message. `None` means the message has no reply.
  pub async fn handle_message(&self, message: ControlMessage) -> Result<Option<ControlReply>> {
    match message {
      ControlMessage::SkipWaiting => {
        self.request_skip_waiting();
        Ok(None)
      }
      ControlMessage::GetVersion => Ok(Some(ControlReply::Version {
        version: self.version().to_string(),
      })),
      ControlMessage::ClearCache => {
        let names = self.store.generation_names().await?;
        for name in &names {
          self.store.delete_generation(name).await?;
        }
        info!(deleted = names.len(), "Cleared all cache generations");
        Ok(Some(ControlReply::Cleared { cleared: true }))
      }
    }
  }
}
