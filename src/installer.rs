//! Install phase: stage the application shell in the temporary store.

use color_eyre::{eyre::WrapErr, Result};
use std::sync::Arc;
use tracing::info;

use crate::cache::{CacheLayer, CacheStorage};
use crate::config::WorkerConfig;
use crate::network::Network;
use crate::request::{AssetRequest, CacheMode};

/// Downloads the shell paths, bypassing intermediate caches, into Temp.
pub struct Installer {
  config: WorkerConfig,
  temp: CacheLayer,
  network: Arc<dyn Network>,
}

impl Installer {
  pub fn new(
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
  ) -> Self {
    let temp = CacheLayer::new(storage, config.stores.temp.clone());
    Self {
      config,
      temp,
      network,
    }
  }

  /// Stage every shell resource. Any failure rejects the whole install and
  /// leaves Temp without a partial shell.
  pub async fn install(&self) -> Result<usize> {
    let resolver = &self.config.resolver;
    let network = &self.network;

    let staged = self
      .temp
      .add_all(&self.config.shell, |path| async move {
        let url = resolver.url_for(&path)?;
        let request = AssetRequest::get(url).with_cache_mode(CacheMode::Reload);
        network.fetch(&request).await
      })
      .await
      .wrap_err("Failed to stage application shell")?;

    info!(store = self.temp.store(), staged, "application shell staged");
    Ok(staged)
  }
}
