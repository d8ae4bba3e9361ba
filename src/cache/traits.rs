//! Core traits and types for the caching system.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::Result;
use tracing::warn;

use crate::request::AssetResponse;

/// A single cached response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
  /// The stored response
  pub response: AssetResponse,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Named, durable key/value stores of logical path to response.
///
/// Each operation is atomic on its own; callers compose them without
/// locking. Stores are created by `open` or implicitly by the first `put`.
#[async_trait]
pub trait CacheStorage: Send + Sync {
  /// Open a store, creating it if missing.
  async fn open(&self, store: &str) -> Result<()>;

  /// Whether a store currently exists.
  async fn has_store(&self, store: &str) -> Result<bool>;

  /// Names of all existing stores.
  async fn store_names(&self) -> Result<Vec<String>>;

  /// Keys held by a store. A missing store has no keys.
  async fn keys(&self, store: &str) -> Result<Vec<String>>;

  /// Look up a single entry.
  async fn get(&self, store: &str, key: &str) -> Result<Option<CachedEntry>>;

  /// Insert or replace an entry.
  async fn put(&self, store: &str, key: &str, response: &AssetResponse) -> Result<()>;

  /// Insert or replace a batch of entries: either all of them are written
  /// or the store keeps its previous contents.
  ///
  /// The default writes entries one by one and, when a write fails, puts
  /// back whatever the already written keys held before.
  async fn put_all(&self, store: &str, entries: &[(String, AssetResponse)]) -> Result<()> {
    let mut written: Vec<(&str, Option<CachedEntry>)> = Vec::with_capacity(entries.len());

    for (key, response) in entries {
      let previous = self.get(store, key).await?;
      if let Err(err) = self.put(store, key, response).await {
        for (key, previous) in written.into_iter().rev() {
          let restored = match previous {
            Some(entry) => self.put(store, key, &entry.response).await,
            None => self.delete(store, key).await.map(|_| ()),
          };
          if let Err(e) = restored {
            warn!(store, key, error = %e, "failed to roll back batch write");
          }
        }
        return Err(err);
      }
      written.push((key.as_str(), previous));
    }

    Ok(())
  }

  /// Remove an entry. Returns whether it existed.
  async fn delete(&self, store: &str, key: &str) -> Result<bool>;

  /// Remove a store and all its entries. Returns whether it existed.
  async fn delete_store(&self, store: &str) -> Result<bool>;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Network failed and a previously cached copy is served instead.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where served data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Live response from the network
  Network,
  /// Cache hit
  Cache,
  /// Network unavailable, serving the last cached copy
  Offline,
}
