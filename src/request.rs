//! Request and response values exchanged with the network and the cache.

use bytes::Bytes;
use reqwest::Method;
use url::Url;

/// How a fetch interacts with intermediate HTTP caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
  #[default]
  Default,
  /// Bypass intermediate caches and revalidate with the origin.
  Reload,
}

/// An intercepted or outgoing asset request.
#[derive(Debug, Clone)]
pub struct AssetRequest {
  pub method: Method,
  pub url: Url,
  pub cache_mode: CacheMode,
}

impl AssetRequest {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      cache_mode: CacheMode::Default,
    }
  }

  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
    self.cache_mode = cache_mode;
    self
  }
}

/// A response body plus the metadata needed to replay it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Bytes,
}

impl AssetResponse {
  pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Status in the 2xx range.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}
