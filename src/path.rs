//! Logical path computation relative to the serving origin.

use color_eyre::{eyre::eyre, Result};
use url::Url;

/// Logical path of the root document.
pub const ROOT_PATH: &str = "/";

/// Cache-busting query marker stripped from routed requests.
const VERSION_QUERY: &str = "?v=";

/// Maps request URLs and stored entry keys to logical paths for one origin.
///
/// The origin is captured once at construction and used by every component,
/// so no code path has to reach for an ambient location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
  origin: Url,
  /// ASCII serialization without trailing slash, e.g. `https://app.example`
  prefix: String,
}

impl PathResolver {
  pub fn new(origin: &Url) -> Result<Self> {
    let serialized = origin.origin().ascii_serialization();
    if serialized == "null" {
      return Err(eyre!("URL {} has no usable origin", origin));
    }
    let origin = Url::parse(&format!("{}/", serialized))
      .map_err(|e| eyre!("Invalid origin {}: {}", serialized, e))?;

    Ok(Self {
      origin,
      prefix: serialized,
    })
  }

  pub fn origin(&self) -> &Url {
    &self.origin
  }

  /// Logical path used to route an intercepted request.
  ///
  /// Strips the origin and a trailing `?v=` cache-buster. The origin root,
  /// a fragment-only URL on the root and an empty path all map to `/`.
  pub fn route_key(&self, url: &Url) -> String {
    let full = url.as_str();
    let mut key = self.strip_origin(full).to_string();

    if let Some(idx) = key.find(VERSION_QUERY) {
      key.truncate(idx);
    }

    if full == self.prefix || full.starts_with(&format!("{}/#", self.prefix)) || key.is_empty() {
      return ROOT_PATH.to_string();
    }
    key
  }

  /// Logical path of an entry already held by a store.
  ///
  /// Stored keys are normally logical paths; absolute URLs on this origin
  /// are reduced to theirs. An empty remainder maps to `/`.
  pub fn entry_key(&self, stored: &str) -> String {
    let key = self.strip_origin(stored);
    if key.is_empty() {
      ROOT_PATH.to_string()
    } else {
      key.to_string()
    }
  }

  /// Absolute URL to fetch for a logical path.
  pub fn url_for(&self, path: &str) -> Result<Url> {
    if path == ROOT_PATH {
      return Ok(self.origin.clone());
    }
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid resource path {}: {}", path, e))
  }

  fn strip_origin<'a>(&self, full: &'a str) -> &'a str {
    if full == self.prefix {
      return "";
    }
    full
      .strip_prefix(self.prefix.as_str())
      .and_then(|rest| rest.strip_prefix('/'))
      .unwrap_or(full)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn resolver() -> PathResolver {
    PathResolver::new(&Url::parse("https://app.example").unwrap()).unwrap()
  }

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_root_variants_resolve_to_slash() {
    let r = resolver();
    assert_eq!(r.route_key(&url("https://app.example")), "/");
    assert_eq!(r.route_key(&url("https://app.example/")), "/");
    assert_eq!(r.route_key(&url("https://app.example/#/settings")), "/");
    assert_eq!(r.route_key(&url("https://app.example/#")), "/");
  }

  #[test]
  fn test_version_query_is_stripped() {
    let r = resolver();
    assert_eq!(r.route_key(&url("https://app.example/main.js?v=123")), "main.js");
    assert_eq!(
      r.route_key(&url("https://app.example/main.js?v=123")),
      r.route_key(&url("https://app.example/main.js"))
    );
    assert_eq!(r.route_key(&url("https://app.example/?v=9")), "/");
  }

  #[test]
  fn test_nested_paths_keep_directories() {
    let r = resolver();
    assert_eq!(
      r.route_key(&url("https://app.example/assets/FontManifest.json")),
      "assets/FontManifest.json"
    );
  }

  #[test]
  fn test_foreign_origin_is_not_a_manifest_path() {
    let r = resolver();
    assert_eq!(
      r.route_key(&url("https://cdn.example/main.js")),
      "https://cdn.example/main.js"
    );
    assert_eq!(
      r.route_key(&url("https://app.example.evil/main.js")),
      "https://app.example.evil/main.js"
    );
  }

  #[test]
  fn test_entry_key_normalization() {
    let r = resolver();
    assert_eq!(r.entry_key(""), "/");
    assert_eq!(r.entry_key("/"), "/");
    assert_eq!(r.entry_key("main.js"), "main.js");
    assert_eq!(r.entry_key("https://app.example/"), "/");
    assert_eq!(r.entry_key("https://app.example/index.html"), "index.html");
  }

  #[test]
  fn test_url_for() {
    let r = resolver();
    assert_eq!(r.url_for("/").unwrap().as_str(), "https://app.example/");
    assert_eq!(
      r.url_for("assets/a.json").unwrap().as_str(),
      "https://app.example/assets/a.json"
    );
  }

  #[test]
  fn test_origin_drops_path() {
    let r = PathResolver::new(&url("https://app.example/some/page")).unwrap();
    assert_eq!(r.origin().as_str(), "https://app.example/");
  }
}
