mod app;
mod cache;
mod config;
mod event;
mod host;
mod http;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::event::HostEvent;
use crate::worker::ControlMessage;

#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(about = "Offline caching proxy for a PWA app shell")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/shellcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Application origin to serve (overrides the config file)
  #[arg(short, long)]
  origin: Option<String>,

  /// Cache generation label (overrides the config file)
  #[arg(long)]
  cache_name: Option<String>,

  /// Keep the cache in memory instead of the SQLite database
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Answer JSON-lines host events from stdin (default)
  Serve,
  /// Populate the current cache generation with the app shell
  Install,
  /// Delete stale cache generations
  Activate,
  /// Fetch a URL through the worker
  Fetch {
    url: String,
    /// Send `Accept: text/html`, as a page navigation would
    #[arg(long)]
    html: bool,
  },
  /// Delete every cache generation
  Clear,
  /// Print the current cache generation label
  Version,
}

impl Command {
  fn into_host_event(self) -> Option<HostEvent> {
    let event = match self {
      Command::Serve => return None,
      Command::Install => HostEvent::Install,
      Command::Activate => HostEvent::Activate,
      Command::Fetch { url, html } => {
        let mut headers = BTreeMap::new();
        if html {
          headers.insert("Accept".to_string(), "text/html".to_string());
        }
        HostEvent::Fetch {
          url,
          method: None,
          headers,
        }
      }
      Command::Clear => HostEvent::Message {
        message: ControlMessage::ClearCache,
      },
      Command::Version => HostEvent::Message {
        message: ControlMessage::GetVersion,
      },
    };
    Some(event)
  }
}

/// Log to a daily file in `log_dir`; stdout carries the host protocol.
fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let appender = tracing_appender::rolling::daily(log_dir, "shellcache.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let filter = EnvFilter::try_from_env("SHELLCACHE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let args = Args::parse();

  // Running without a log file is better than not running at all
  let _guard = match config::data_dir().and_then(|dir| init_tracing(&dir.join("logs"))) {
    Ok(guard) => Some(guard),
    Err(e) => {
      eprintln!("shellcache: logging disabled: {}", e);
      None
    }
  };

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Override origin and version if specified on command line
  if let Some(origin) = args.origin {
    config.origin = origin;
  }
  if let Some(cache_name) = args.cache_name {
    config.cache_name = cache_name;
  }

  let app = app::App::new(config, args.ephemeral)?;
  match args.command.and_then(Command::into_host_event) {
    Some(event) => app.run_once(event).await?,
    None => app.serve().await?,
  }

  Ok(())
}
