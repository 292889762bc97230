use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::cache::{CacheStore, MemoryStore, SqliteStore};
use crate::config::Config;
use crate::event::{Event, EventHandler, HostEvent};
use crate::host::{SessionNotifier, SessionWindows};
use crate::http::{parse_method, Fetcher, HttpFetcher, Method, Request, Response};
use crate::worker::OfflineWorker;

/// Embedding host: owns the worker and its collaborators and feeds it events.
pub struct App {
  worker: OfflineWorker,
  fetcher: Arc<HttpFetcher>,
  notifier: Arc<SessionNotifier>,
}

impl App {
  pub fn new(config: Config, ephemeral: bool) -> Result<Self> {
    let fetcher = Arc::new(HttpFetcher::new(&config)?);
    let store: Arc<dyn CacheStore> = if ephemeral {
      Arc::new(MemoryStore::new())
    } else {
      Arc::new(SqliteStore::open(&config.cache_db_path()?)?)
    };
    let windows = Arc::new(SessionWindows::new());
    let notifier = Arc::new(SessionNotifier::new());

    let worker = OfflineWorker::new(
      config,
      fetcher.clone(),
      store,
      windows,
      notifier.clone(),
    )?;

    Ok(Self {
      worker,
      fetcher,
      notifier,
    })
  }

  /// Handle a single event and print its result.
  pub async fn run_once(&self, event: HostEvent) -> Result<()> {
    let result = handle(&self.worker, &self.fetcher, event).await?;
    let output =
      serde_json::to_string_pretty(&result).map_err(|e| eyre!("Failed to encode output: {}", e))?;
    println!("{}", output);
    Ok(())
  }

  /// Read JSON-lines events from stdin until EOF, answering each on stdout.
  ///
  /// Lifecycle events are awaited in order; everything else runs on its own
  /// task, so output lines may come back out of input order.
  pub async fn serve(&self) -> Result<()> {
    let mut events = EventHandler::new();
    let tx = events.sender();
    let mut pending = 0usize;
    let mut closing = false;

    info!(version = self.worker.version(), "Serving host events");

    while let Some(event) = events.next().await {
      match event {
        Event::Host { id, event } if event.is_lifecycle() => {
          let name = event.name();
          let result = handle(&self.worker, &self.fetcher, event).await;
          println!("{}", output_line(id, name, result));
        }
        Event::Host { id, event } => {
          pending += 1;
          let worker = self.worker.clone();
          let fetcher = self.fetcher.clone();
          let tx = tx.clone();
          tokio::spawn(async move {
            let name = event.name();
            let result = handle(&worker, &fetcher, event).await;
            let _ = tx.send(Event::Completed(output_line(id, name, result)));
          });
        }
        Event::Invalid { id, error } => {
          warn!(id, error = %error, "Ignoring malformed host event");
          println!("{}", json!({ "id": id, "ok": false, "error": error }));
        }
        Event::Completed(line) => {
          pending = pending.saturating_sub(1);
          println!("{}", line);
        }
        Event::InputClosed => closing = true,
      }

      if closing && pending == 0 {
        break;
      }
    }

    info!(
      visible_notifications = self.notifier.visible()?.len(),
      "Host input closed"
    );
    Ok(())
  }
}

fn output_line(id: u64, event: &str, result: Result<Value>) -> Value {
  match result {
    Ok(result) => json!({ "id": id, "event": event, "ok": true, "result": result }),
    Err(e) => json!({ "id": id, "event": event, "ok": false, "error": e.to_string() }),
  }
}

/// Route one host event to the worker.
async fn handle(worker: &OfflineWorker, fetcher: &HttpFetcher, event: HostEvent) -> Result<Value> {
  let value = match event {
    HostEvent::Install => to_json(&worker.on_install().await?)?,
    HostEvent::Activate => to_json(&worker.on_activate().await?)?,
    HostEvent::Fetch {
      url,
      method,
      headers,
    } => {
      let method = match method {
        Some(m) => parse_method(&m)?,
        None => Method::GET,
      };
      let url = Url::parse(&url).map_err(|e| eyre!("Invalid request URL '{}': {}", url, e))?;
      let mut request = Request::new(method, url);
      for (name, value) in &headers {
        request = request.with_header(name, value);
      }

      match worker.handle_fetch(&request).await? {
        Some(outcome) => json!({
          "intercepted": true,
          "class": outcome.class,
          "source": outcome.source,
          "response": response_json(&outcome.response),
        }),
        None => {
          let response = fetcher.fetch(&request).await?;
          json!({ "intercepted": false, "response": response_json(&response) })
        }
      }
    }
    HostEvent::Push { payload } => {
      let payload = payload.as_deref().map(str::as_bytes);
      to_json(&worker.on_push(payload).await?)?
    }
    HostEvent::NotificationClick(click) => to_json(&worker.on_notification_click(&click).await?)?,
    HostEvent::Sync { tag } => {
      worker.on_sync(&tag).await?;
      json!({ "acknowledged": true })
    }
    HostEvent::Message { message } => {
      let reply = worker.handle_message(message).await?;
      json!({
        "reply": reply,
        "skip_waiting": worker.skip_waiting_requested(),
      })
    }
  };
  Ok(value)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
  serde_json::to_value(value).map_err(|e| eyre!("Failed to encode result: {}", e))
}

fn response_json(response: &Response) -> Value {
  json!({
    "status": response.status,
    "status_text": response.status_text,
    "headers": response.headers,
    "body": response.text(),
  })
}
