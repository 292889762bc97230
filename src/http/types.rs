use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use url::Url;

pub use reqwest::Method;

/// Body of the structured error returned when a live endpoint is unreachable.
pub const OFFLINE_ERROR_MESSAGE: &str = "Sem conexão";

/// Parse a method name as supplied by a host, ignoring case.
pub fn parse_method(name: &str) -> Result<Method> {
  Method::from_bytes(name.to_ascii_uppercase().as_bytes())
    .map_err(|e| eyre!("Unsupported request method '{}': {}", name, e))
}

/// An intercepted outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  /// Header pairs in the order they were supplied; names compare case-insensitively
  pub headers: Vec<(String, String)>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Vec::new(),
    }
  }

  /// Parse `url` and build a GET request for it.
  pub fn get(url: &str) -> Result<Self> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid request URL '{}': {}", url, e))?;
    Ok(Self::new(Method::GET, url))
  }

  /// Only plain reads are intercepted; everything else goes straight to the network.
  pub fn is_intercepted(&self) -> bool {
    self.method == Method::GET
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Whether the `Accept` header asks for an HTML document.
  pub fn accepts_html(&self) -> bool {
    self
      .header("accept")
      .map(|accept| accept.to_ascii_lowercase().contains("text/html"))
      .unwrap_or(false)
  }

  pub fn path(&self) -> &str {
    self.url.path()
  }

  /// The URL with query string and fragment removed.
  pub fn url_without_query(&self) -> String {
    let mut url = self.url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.into()
  }

  /// Same request aimed at a different URL, keeping method and headers.
  pub fn redirected(&self, url: Url) -> Self {
    Self {
      method: self.method.clone(),
      url,
      headers: self.headers.clone(),
    }
  }
}

/// A response snapshot: what the network returned or what the cache holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      status_text: status_text(status),
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  #[cfg(test)]
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// 2xx status
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }

  /// Empty response returned when neither cache nor network can answer.
  pub fn failure() -> Self {
    Self::new(408, Vec::new())
  }

  /// Structured JSON error for live endpoints that could not be reached.
  pub fn offline_json() -> Self {
    let body = serde_json::json!({ "error": OFFLINE_ERROR_MESSAGE }).to_string();
    Self::new(503, body).with_header("Content-Type", "application/json")
  }

  /// Minimal offline page used when the offline document itself was never cached.
  pub fn offline_page(app_name: &str) -> Self {
    let body = format!(
      "<!DOCTYPE html><html lang=\"pt-BR\"><head><meta charset=\"utf-8\"><title>{0}</title></head>\
       <body><h1>{0}</h1><p>Você está offline.</p></body></html>",
      app_name
    );
    Self::new(503, body).with_header("Content-Type", "text/html; charset=utf-8")
  }
}

/// Canonical reason phrase, empty for unregistered codes.
pub fn status_text(status: u16) -> String {
  StatusCode::from_u16(status)
    .ok()
    .and_then(|s| s.canonical_reason())
    .unwrap_or_default()
    .to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_accepts_html_is_case_insensitive() {
    let request = Request::get("http://localhost/")
      .unwrap()
      .with_header("ACCEPT", "Text/HTML,application/xhtml+xml");
    assert!(request.accepts_html());

    let request = Request::get("http://localhost/api/x")
      .unwrap()
      .with_header("Accept", "application/json");
    assert!(!request.accepts_html());
  }

  #[test]
  fn test_url_without_query() {
    let request = Request::get("http://localhost/css/app.css?v=3#top").unwrap();
    assert_eq!(request.url_without_query(), "http://localhost/css/app.css");
  }

  #[test]
  fn test_offline_json_body() {
    let response = Response::offline_json();
    assert_eq!(response.status, 503);
    assert_eq!(response.text(), r#"{"error":"Sem conexão"}"#);
    assert_eq!(response.header("content-type"), Some("application/json"));
  }

  #[test]
  fn test_method_parsing() {
    assert_eq!(parse_method("get").unwrap(), Method::GET);
    assert_eq!(parse_method("Delete").unwrap(), Method::DELETE);
    assert!(parse_method("NOT A METHOD").is_err());
  }

  #[test]
  fn test_only_get_is_intercepted() {
    let url = Url::parse("http://localhost/api/x").unwrap();
    assert!(Request::new(Method::GET, url.clone()).is_intercepted());
    assert!(!Request::new(Method::POST, url.clone()).is_intercepted());
    assert!(!Request::new(Method::HEAD, url).is_intercepted());
  }

  #[test]
  fn test_status_text_follows_status_code() {
    assert_eq!(Response::failure().status_text, "Request Timeout");
    assert_eq!(Response::offline_json().status_text, "Service Unavailable");
    assert_eq!(Response::new(299, "").status_text, "");
  }
}
