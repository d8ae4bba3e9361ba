//! Resource manifest: logical path to content fingerprint.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

/// Immutable mapping of logical resource path to content fingerprint.
///
/// A manifest is handed over wholesale per deployment. The previous
/// deployment's manifest is persisted as a snapshot with the same
/// serialized shape (a flat JSON object keyed by logical path).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceManifest {
  entries: BTreeMap<String, String>,
}

impl ResourceManifest {
  pub fn new(entries: BTreeMap<String, String>) -> Self {
    Self { entries }
  }

  /// Fingerprint recorded for a logical path.
  pub fn fingerprint(&self, path: &str) -> Option<&str> {
    self.entries.get(path).map(String::as_str)
  }

  pub fn contains(&self, path: &str) -> bool {
    self.entries.contains_key(path)
  }

  /// Logical paths in sorted order.
  pub fn paths(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Stable identifier for this deployment's manifest.
  ///
  /// SHA-256 over the sorted `path\0fingerprint\n` pairs, hex encoded.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    for (path, fingerprint) in &self.entries {
      hasher.update(path.as_bytes());
      hasher.update([0u8]);
      hasher.update(fingerprint.as_bytes());
      hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
  }

  pub fn from_json(bytes: &[u8]) -> Result<Self> {
    serde_json::from_slice(bytes).map_err(|e| eyre!("Failed to parse resource manifest: {}", e))
  }

  pub fn to_json(&self) -> Result<Vec<u8>> {
    serde_json::to_vec(self).map_err(|e| eyre!("Failed to serialize resource manifest: {}", e))
  }

  /// Load a manifest from a JSON file produced by the build.
  pub fn load(path: &Path) -> Result<Self> {
    let contents = std::fs::read(path)
      .map_err(|e| eyre!("Failed to read manifest {}: {}", path.display(), e))?;
    Self::from_json(&contents)
  }
}

impl<K, V> FromIterator<(K, V)> for ResourceManifest
where
  K: Into<String>,
  V: Into<String>,
{
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self {
      entries: iter
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_snapshot_shape_is_flat_object() {
    let manifest: ResourceManifest = [("/", "abc"), ("main.js", "def")].into_iter().collect();
    let json = manifest.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(value, serde_json::json!({ "/": "abc", "main.js": "def" }));
    assert_eq!(ResourceManifest::from_json(&json).unwrap(), manifest);
  }

  #[test]
  fn test_digest_tracks_fingerprints() {
    let a: ResourceManifest = [("main.js", "1")].into_iter().collect();
    let b: ResourceManifest = [("main.js", "2")].into_iter().collect();
    assert_eq!(a.digest(), a.clone().digest());
    assert_ne!(a.digest(), b.digest());
    assert_eq!(a.digest().len(), 64);
  }

  #[test]
  fn test_rejects_non_object() {
    assert!(ResourceManifest::from_json(b"[1, 2]").is_err());
  }
}
