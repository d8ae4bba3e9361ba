use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::manifest::ResourceManifest;
use crate::path::PathResolver;

/// Reserved store names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreNames {
  /// Durable serving cache
  pub content: String,
  /// Staging store filled during install, deleted after activation
  pub temp: String,
  /// Single-entry store holding the previous manifest snapshot
  pub manifest: String,
}

impl Default for StoreNames {
  fn default() -> Self {
    Self {
      content: "precache-app-cache".to_string(),
      temp: "precache-temp-cache".to_string(),
      manifest: "precache-app-manifest".to_string(),
    }
  }
}

/// Application shell downloaded before the worker can serve anything.
pub fn default_shell() -> Vec<String> {
  [
    "main.dart.js",
    "index.html",
    "flutter_bootstrap.js",
    "assets/AssetManifest.bin.json",
    "assets/FontManifest.json",
  ]
  .into_iter()
  .map(String::from)
  .collect()
}

/// On-disk host configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Serving origin, e.g. `https://app.example`
  pub origin: String,
  /// Resource manifest JSON produced by the build (relative to the config file)
  pub manifest: PathBuf,
  #[serde(default)]
  pub stores: StoreNames,
  #[serde(default = "default_shell")]
  pub shell: Vec<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./precache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/precache/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/precache/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("precache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("precache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let mut config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    if config.manifest.is_relative() {
      if let Some(dir) = path.parent() {
        config.manifest = dir.join(&config.manifest);
      }
    }

    Ok(config)
  }

  /// Build the immutable worker configuration, reading the manifest file.
  pub fn worker_config(&self) -> Result<WorkerConfig> {
    let manifest = ResourceManifest::load(&self.manifest)?;
    WorkerConfig::new(&self.origin, manifest)
      .map(|c| c.with_stores(self.stores.clone()).with_shell(self.shell.clone()))
  }
}

/// Everything a worker needs, fixed for the lifetime of one deployment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
  pub resolver: PathResolver,
  pub manifest: Arc<ResourceManifest>,
  pub stores: StoreNames,
  pub shell: Vec<String>,
}

impl WorkerConfig {
  pub fn new(origin: &str, manifest: ResourceManifest) -> Result<Self> {
    let origin =
      url::Url::parse(origin).map_err(|e| eyre!("Invalid origin '{}': {}", origin, e))?;

    Ok(Self {
      resolver: PathResolver::new(&origin)?,
      manifest: Arc::new(manifest),
      stores: StoreNames::default(),
      shell: default_shell(),
    })
  }

  pub fn with_stores(mut self, stores: StoreNames) -> Self {
    self.stores = stores;
    self
  }

  pub fn with_shell(mut self, shell: Vec<String>) -> Self {
    self.shell = shell;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_load_resolves_manifest_next_to_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
      dir.path().join("resources.json"),
      r#"{"/": "aa", "index.html": "aa", "main.dart.js": "bb"}"#,
    )
    .unwrap();
    let config_path = dir.path().join("precache.yaml");
    std::fs::write(
      &config_path,
      "origin: https://app.example\nmanifest: resources.json\nshell:\n  - index.html\n",
    )
    .unwrap();

    let config = Config::load(Some(&config_path)).unwrap();
    assert_eq!(config.stores, StoreNames::default());
    assert_eq!(config.shell, vec!["index.html"]);

    let worker = config.worker_config().unwrap();
    assert_eq!(worker.manifest.len(), 3);
    assert_eq!(worker.resolver.origin().as_str(), "https://app.example/");
  }

  #[test]
  fn test_partial_store_names_keep_defaults() {
    let yaml = "origin: https://app.example\nmanifest: m.json\nstores:\n  temp: staging\n";
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.stores.temp, "staging");
    assert_eq!(config.stores.content, StoreNames::default().content);
    assert_eq!(config.shell, default_shell());
  }

  #[test]
  fn test_missing_explicit_path_errors() {
    let dir = TempDir::new().unwrap();
    assert!(Config::load(Some(&dir.path().join("nope.yaml"))).is_err());
  }

  #[test]
  fn test_invalid_origin_errors() {
    assert!(WorkerConfig::new("not a url", ResourceManifest::default()).is_err());
  }
}
