//! Request classification.

use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use url::{Origin, Url};

use crate::http::Request;

/// File extensions served with stale-while-revalidate.
const STATIC_EXTENSIONS: &[&str] = &[
  "css", "js", "mjs", "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "woff", "woff2", "ttf",
  "otf", "eot",
];

/// Category of an intercepted request. Each maps to one caching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
  /// Another origin (fonts, CDNs)
  CrossOrigin,
  /// Live data or authenticated views
  NeverCache,
  /// HTML navigation
  Document,
  /// Stylesheets, scripts, images, fonts
  StaticAsset,
  Default,
}

/// The application's own origin and its never-cache routes.
#[derive(Debug, Clone)]
pub struct Scope {
  base: Url,
  origin: Origin,
  never_cache: Vec<String>,
}

impl Scope {
  pub fn new(origin: &str, never_cache: &[String]) -> Result<Self> {
    let base = Url::parse(origin).map_err(|e| eyre!("Invalid origin '{}': {}", origin, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("Origin '{}' cannot be used as a base URL", origin));
    }

    Ok(Self {
      origin: base.origin(),
      base,
      never_cache: never_cache.to_vec(),
    })
  }

  /// Resolve an app-relative path (or absolute URL) against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path)
      .map_err(|e| eyre!("Invalid path '{}': {}", path, e))
  }

  pub fn is_same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin
  }

  fn is_never_cache(&self, path: &str) -> bool {
    self
      .never_cache
      .iter()
      .any(|prefix| path.starts_with(prefix.as_str()))
  }
}

/// Classify a request. Returns `None` for methods that are not intercepted.
///
/// Rules are checked in order and the first match wins, so a never-cache
/// prefix outranks the HTML checks (deep links into authenticated panels
/// stay live).
pub fn classify(request: &Request, scope: &Scope) -> Option<RequestClass> {
  if !request.is_intercepted() {
    return None;
  }

  if !scope.is_same_origin(&request.url) {
    return Some(RequestClass::CrossOrigin);
  }

  let path = request.path();
  if scope.is_never_cache(path) {
    return Some(RequestClass::NeverCache);
  }

  if request.accepts_html() || has_extension(path, "html") || path == "/" {
    return Some(RequestClass::Document);
  }

  if is_static_asset(path) {
    return Some(RequestClass::StaticAsset);
  }

  Some(RequestClass::Default)
}

/// Extension of the last path segment, if it has one.
fn extension(path: &str) -> Option<&str> {
  let file_name = path.rsplit('/').next().unwrap_or_default();
  file_name.rsplit_once('.').map(|(_, ext)| ext)
}

fn has_extension(path: &str, wanted: &str) -> bool {
  extension(path).is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

fn is_static_asset(path: &str) -> bool {
  extension(path).is_some_and(|ext| {
    STATIC_EXTENSIONS
      .iter()
      .any(|known| known.eq_ignore_ascii_case(ext))
  })
}
