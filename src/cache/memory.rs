//! In-memory cache storage.

use async_trait::async_trait;
use chrono::Utc;
use color_eyre::Result;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::traits::{CacheStorage, CachedEntry};
use crate::request::AssetResponse;

/// Volatile storage backend, used for tests and ephemeral hosts.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  stores: Mutex<HashMap<String, BTreeMap<String, CachedEntry>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
  async fn open(&self, store: &str) -> Result<()> {
    self
      .stores
      .lock()
      .await
      .entry(store.to_string())
      .or_default();
    Ok(())
  }

  async fn has_store(&self, store: &str) -> Result<bool> {
    Ok(self.stores.lock().await.contains_key(store))
  }

  async fn store_names(&self) -> Result<Vec<String>> {
    let mut names: Vec<String> = self.stores.lock().await.keys().cloned().collect();
    names.sort();
    Ok(names)
  }

  async fn keys(&self, store: &str) -> Result<Vec<String>> {
    Ok(
      self
        .stores
        .lock()
        .await
        .get(store)
        .map(|entries| entries.keys().cloned().collect())
        .unwrap_or_default(),
    )
  }

  async fn get(&self, store: &str, key: &str) -> Result<Option<CachedEntry>> {
    Ok(
      self
        .stores
        .lock()
        .await
        .get(store)
        .and_then(|entries| entries.get(key))
        .cloned(),
    )
  }

  async fn put(&self, store: &str, key: &str, response: &AssetResponse) -> Result<()> {
    let entry = CachedEntry {
      response: response.clone(),
      cached_at: Utc::now(),
    };
    self
      .stores
      .lock()
      .await
      .entry(store.to_string())
      .or_default()
      .insert(key.to_string(), entry);
    Ok(())
  }

  async fn put_all(&self, store: &str, entries: &[(String, AssetResponse)]) -> Result<()> {
    let cached_at = Utc::now();
    let mut stores = self.stores.lock().await;
    let target = stores.entry(store.to_string()).or_default();
    for (key, response) in entries {
      let entry = CachedEntry {
        response: response.clone(),
        cached_at,
      };
      target.insert(key.clone(), entry);
    }
    Ok(())
  }

  async fn delete(&self, store: &str, key: &str) -> Result<bool> {
    Ok(
      self
        .stores
        .lock()
        .await
        .get_mut(store)
        .map(|entries| entries.remove(key).is_some())
        .unwrap_or(false),
    )
  }

  async fn delete_store(&self, store: &str) -> Result<bool> {
    Ok(self.stores.lock().await.remove(store).is_some())
  }
}
