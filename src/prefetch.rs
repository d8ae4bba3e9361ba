//! Offline prefetch: fill Content with every manifest resource it lacks.

use color_eyre::{eyre::WrapErr, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::cache::{CacheLayer, CacheStorage};
use crate::config::WorkerConfig;
use crate::network::Network;
use crate::request::AssetRequest;

pub struct Prefetcher {
  config: WorkerConfig,
  storage: Arc<dyn CacheStorage>,
  content: CacheLayer,
  network: Arc<dyn Network>,
}

impl Prefetcher {
  pub fn new(
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
  ) -> Self {
    let content = CacheLayer::new(storage.clone(), config.stores.content.clone());
    Self {
      config,
      storage,
      content,
      network,
    }
  }

  /// Manifest paths with no entry in Content yet.
  pub async fn missing(&self) -> Result<Vec<String>> {
    let present: HashSet<String> = self
      .storage
      .keys(&self.config.stores.content)
      .await?
      .iter()
      .map(|key| self.config.resolver.entry_key(key))
      .collect();

    Ok(
      self
        .config
        .manifest
        .paths()
        .filter(|path| !present.contains(*path))
        .map(String::from)
        .collect(),
    )
  }

  /// Download every missing resource in one batch. If any of them fails,
  /// nothing from the batch is stored.
  pub async fn download_offline(&self) -> Result<usize> {
    let missing = self.missing().await?;
    if missing.is_empty() {
      info!("all resources already cached");
      return Ok(0);
    }

    let resolver = &self.config.resolver;
    let network = &self.network;
    let stored = self
      .content
      .add_all(&missing, |path| async move {
        let request = AssetRequest::get(resolver.url_for(&path)?);
        network.fetch(&request).await
      })
      .await
      .wrap_err("Failed to prefetch resources")?;

    info!(stored, "offline resources downloaded");
    Ok(stored)
  }
}
