use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "shellcache";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin of the application the worker serves (scheme://host[:port])
  pub origin: String,
  /// Version label of the current cache generation
  pub cache_name: String,
  /// Application name, used as default notification title
  pub app_name: String,
  /// App shell resources cached on install, relative to `origin`
  pub precache: Vec<String>,
  /// Path prefixes that are always fetched live and never stored
  pub never_cache: Vec<String>,
  /// Cross-origin hosts whose responses may be written to the cache (case-insensitive)
  #[serde(deserialize_with = "deserialize_lowercase_set")]
  pub cross_origin_allow: BTreeSet<String>,
  /// Path of the document served when navigation fails offline
  pub offline_document: String,
  pub notification: NotificationConfig,
  pub user_agent: String,
  /// Cache database location (defaults to $XDG_DATA_HOME/shellcache/cache.db)
  pub cache_db: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub body: String,
  pub icon: String,
  pub badge: String,
  /// Tag shared by notifications that should replace each other
  pub tag: String,
  /// Page opened when a notification carries no target URL
  pub url: String,
  pub vibrate: Vec<u32>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:3000".to_string(),
      cache_name: "convencao-v1".to_string(),
      app_name: "Convenção".to_string(),
      precache: [
        "/",
        "/index.html",
        "/offline.html",
        "/manifest.json",
        "/css/style.css",
        "/js/main.js",
        "/icons/icon-192x192.png",
        "/icons/icon-512x512.png",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      never_cache: ["/api/", "/auth/", "/painel-ministro", "/painel-admin"]
        .into_iter()
        .map(String::from)
        .collect(),
      cross_origin_allow: [
        "fonts.googleapis.com",
        "fonts.gstatic.com",
        "cdn.jsdelivr.net",
        "cdnjs.cloudflare.com",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      offline_document: "/offline.html".to_string(),
      notification: NotificationConfig::default(),
      user_agent: format!("{}/{}", APP_DIR, env!("CARGO_PKG_VERSION")),
      cache_db: None,
    }
  }
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      body: "Você tem uma nova notificação".to_string(),
      icon: "/icons/icon-192x192.png".to_string(),
      badge: "/icons/icon-72x72.png".to_string(),
      tag: "convencao-notification".to_string(),
      url: "/".to_string(),
      vibrate: vec![200, 100, 200],
    }
  }
}

fn deserialize_lowercase_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.into_iter().map(|s| s.to_lowercase()).collect())
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shellcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shellcache/config.yaml
  ///
  /// Built-in defaults apply when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shellcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join(APP_DIR).join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  /// Location of the cache database.
  pub fn cache_db_path(&self) -> Result<PathBuf> {
    match &self.cache_db {
      Some(path) => Ok(path.clone()),
      None => Ok(data_dir()?.join("cache.db")),
    }
  }
}

/// Per-user data directory for the cache database and logs.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join(APP_DIR))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_cover_authenticated_panels() {
    let config = Config::default();
    assert!(config.never_cache.iter().any(|p| p == "/painel-ministro"));
    assert!(config.never_cache.iter().any(|p| p == "/painel-admin"));
    assert!(config.precache.contains(&config.offline_document));
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::from_yaml(
      r#"
origin: "https://convencao.example.org"
cache_name: "convencao-v7"
cross_origin_allow:
  - Fonts.GoogleAPIs.com
notification:
  tag: "avisos"
"#,
    )
    .unwrap();

    assert_eq!(config.origin, "https://convencao.example.org");
    assert_eq!(config.cache_name, "convencao-v7");
    assert!(config.cross_origin_allow.contains("fonts.googleapis.com"));
    assert_eq!(config.cross_origin_allow.len(), 1);
    assert_eq!(config.notification.tag, "avisos");
    assert_eq!(config.notification.vibrate, vec![200, 100, 200]);
    assert_eq!(config.offline_document, "/offline.html");
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/shellcache.yaml"))).is_err());
  }
}
