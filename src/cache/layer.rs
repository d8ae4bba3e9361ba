//! Cache layer that orchestrates caching strategies with network fetching.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::traits::{CacheResult, CacheStorage};
use crate::request::AssetResponse;

/// Cache layer bound to a single named store.
///
/// This layer sits between the request router and the network,
/// providing cache-first and network-first strategies plus the
/// all-or-nothing batch population used by install and prefetch.
pub struct CacheLayer {
  storage: Arc<dyn CacheStorage>,
  store: String,
}

impl CacheLayer {
  pub fn new(storage: Arc<dyn CacheStorage>, store: impl Into<String>) -> Self {
    Self {
      storage,
      store: store.into(),
    }
  }

  pub fn store(&self) -> &str {
    &self.store
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Serve the cached entry if present
  /// 2. Otherwise fetch from network
  /// 3. Store a copy only when the response status is 2xx
  pub async fn fetch_cache_first<F, Fut>(
    &self,
    key: &str,
    fetcher: F,
  ) -> Result<CacheResult<AssetResponse>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<AssetResponse>>,
  {
    if let Some(cached) = self.storage.get(&self.store, key).await? {
      debug!(store = %self.store, key, "cache hit");
      return Ok(CacheResult::from_cache(cached.response, cached.cached_at));
    }

    let response = fetcher().await?;
    if response.is_ok() {
      self.store_copy(key, &response).await;
    } else {
      debug!(key, status = response.status, "not caching unsuccessful response");
    }
    Ok(CacheResult::from_network(response))
  }

  /// Fetch with network-first strategy.
  ///
  /// 1. Try the network and store whatever it returns
  /// 2. On network failure, serve the cached copy (offline mode)
  /// 3. Without a cached copy, the network error propagates
  pub async fn fetch_network_first<F, Fut>(
    &self,
    key: &str,
    fetcher: F,
  ) -> Result<CacheResult<AssetResponse>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<AssetResponse>>,
  {
    match fetcher().await {
      Ok(response) => {
        self.store_copy(key, &response).await;
        Ok(CacheResult::from_network(response))
      }
      Err(err) => match self.storage.get(&self.store, key).await {
        Ok(Some(cached)) => {
          warn!(key, error = %err, "network failed, serving cached copy");
          Ok(CacheResult::offline(cached.response, cached.cached_at))
        }
        Ok(None) => Err(err),
        Err(lookup) => {
          warn!(key, error = %lookup, "cache lookup failed after network failure");
          Err(err)
        }
      },
    }
  }

  /// Fetch every key and store all responses, or store nothing.
  ///
  /// Fetches run concurrently. Any fetch failure or non-2xx status fails
  /// the whole batch before a single entry is written, and the responses
  /// are then written through `put_all` as one unit.
  pub async fn add_all<F, Fut>(&self, keys: &[String], fetcher: F) -> Result<usize>
  where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<AssetResponse>>,
  {
    let fetches = keys.iter().map(|key| {
      let fut = fetcher(key.clone());
      async move {
        let response = fut.await?;
        if !response.is_ok() {
          return Err(eyre!(
            "Request for {} returned status {}",
            key,
            response.status
          ));
        }
        Ok::<_, color_eyre::Report>((key.clone(), response))
      }
    });

    let responses = try_join_all(fetches).await?;
    self.storage.put_all(&self.store, &responses).await?;

    Ok(responses.len())
  }

  /// Write a copy of a served response. Failures are logged, not surfaced.
  async fn store_copy(&self, key: &str, response: &AssetResponse) {
    if let Err(e) = self.storage.put(&self.store, key, response).await {
      warn!(store = %self.store, key, error = %e, "failed to store response copy");
    }
  }
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      store: self.store.clone(),
    }
  }
}
