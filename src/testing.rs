//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::cache::{CacheStorage, CachedEntry, MemoryStorage};
use crate::manifest::ResourceManifest;
use crate::network::Network;
use crate::request::{AssetRequest, AssetResponse, CacheMode};

pub const ORIGIN: &str = "https://app.example";

pub fn origin() -> Url {
  Url::parse(ORIGIN).unwrap()
}

pub fn url(path: &str) -> Url {
  origin().join(path).unwrap()
}

pub fn manifest(pairs: &[(&str, &str)]) -> ResourceManifest {
  pairs.iter().map(|(p, f)| (*p, *f)).collect()
}

/// Canned network keyed by URL path (without the leading slash, `/` for root).
#[derive(Default)]
pub struct StubNetwork {
  responses: Mutex<HashMap<String, AssetResponse>>,
  offline: AtomicBool,
  calls: AtomicUsize,
  requests: Mutex<Vec<(String, CacheMode)>>,
}

impl StubNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  /// Serve `200 <body>` for a path.
  pub fn serve(&self, path: &str, body: &str) {
    self.respond(path, AssetResponse::new(200, body.to_string()));
  }

  pub fn respond(&self, path: &str, response: AssetResponse) {
    self
      .responses
      .lock()
      .unwrap()
      .insert(path.to_string(), response);
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn requests(&self) -> Vec<(String, CacheMode)> {
    self.requests.lock().unwrap().clone()
  }
}

fn stub_key(url: &Url) -> String {
  let path = url.path().trim_start_matches('/');
  if path.is_empty() {
    "/".to_string()
  } else {
    path.to_string()
  }
}

#[async_trait]
impl Network for StubNetwork {
  async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let key = stub_key(&request.url);
    self
      .requests
      .lock()
      .unwrap()
      .push((key.clone(), request.cache_mode));

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("network unreachable: {}", request.url));
    }
    self
      .responses
      .lock()
      .unwrap()
      .get(&key)
      .cloned()
      .ok_or_else(|| eyre!("connection refused: {}", request.url))
  }
}

/// Memory storage whose writes to one store start failing on demand.
///
/// Only the single-entry operations are overridden, so batch writes go
/// through the trait's default `put_all`.
pub struct FailingStorage {
  inner: MemoryStorage,
  fail_store: String,
  armed: AtomicBool,
  /// Successful puts left before a one-off put failure; `usize::MAX` when off
  put_countdown: AtomicUsize,
  resets_fail: AtomicBool,
}

impl FailingStorage {
  pub fn new(fail_store: &str) -> Self {
    Self {
      inner: MemoryStorage::new(),
      fail_store: fail_store.to_string(),
      armed: AtomicBool::new(false),
      put_countdown: AtomicUsize::new(usize::MAX),
      resets_fail: AtomicBool::new(false),
    }
  }

  /// Fail every put and delete on the chosen store from now on.
  pub fn arm(&self) {
    self.armed.store(true, Ordering::SeqCst);
  }

  /// Let `n` puts on the chosen store through, then fail exactly one.
  pub fn fail_put_after(&self, n: usize) {
    self.put_countdown.store(n, Ordering::SeqCst);
  }

  /// Fail every `delete_store`, whatever the store.
  pub fn fail_resets(&self) {
    self.resets_fail.store(true, Ordering::SeqCst);
  }

  fn check(&self, store: &str) -> Result<()> {
    if self.armed.load(Ordering::SeqCst) && store == self.fail_store {
      return Err(eyre!("injected write failure on {}", store));
    }
    Ok(())
  }

  fn check_put(&self, store: &str) -> Result<()> {
    self.check(store)?;
    if store != self.fail_store {
      return Ok(());
    }
    let left = self.put_countdown.load(Ordering::SeqCst);
    if left == usize::MAX {
      return Ok(());
    }
    if left == 0 {
      self.put_countdown.store(usize::MAX, Ordering::SeqCst);
      return Err(eyre!("injected write failure on {}", store));
    }
    self.put_countdown.store(left - 1, Ordering::SeqCst);
    Ok(())
  }
}

#[async_trait]
impl CacheStorage for FailingStorage {
  async fn open(&self, store: &str) -> Result<()> {
    self.inner.open(store).await
  }

  async fn has_store(&self, store: &str) -> Result<bool> {
    self.inner.has_store(store).await
  }

  async fn store_names(&self) -> Result<Vec<String>> {
    self.inner.store_names().await
  }

  async fn keys(&self, store: &str) -> Result<Vec<String>> {
    self.inner.keys(store).await
  }

  async fn get(&self, store: &str, key: &str) -> Result<Option<CachedEntry>> {
    self.inner.get(store, key).await
  }

  async fn put(&self, store: &str, key: &str, response: &AssetResponse) -> Result<()> {
    self.check_put(store)?;
    self.inner.put(store, key, response).await
  }

  async fn delete(&self, store: &str, key: &str) -> Result<bool> {
    self.check(store)?;
    self.inner.delete(store, key).await
  }

  async fn delete_store(&self, store: &str) -> Result<bool> {
    if self.resets_fail.load(Ordering::SeqCst) {
      return Err(eyre!("injected delete failure on {}", store));
    }
    self.inner.delete_store(store).await
  }
}
