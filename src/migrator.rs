//! Activate phase: reconcile the content store against a new manifest.
//!
//! The previous deployment's manifest is kept as a snapshot. Cached entries
//! whose fingerprint is unchanged between the snapshot and the current
//! manifest survive the upgrade; everything else is evicted. The freshly
//! staged shell then overwrites whatever is left for its paths.
//!
//! Any error mid-way leaves the stores in an unknown state, so all three
//! reserved stores are deleted and the next activation starts over as a
//! first install.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::manifest::ResourceManifest;
use crate::request::AssetResponse;

/// Key of the single entry in the manifest store.
pub const SNAPSHOT_KEY: &str = "manifest";

/// What an activation did to the stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
  /// No prior snapshot: Content was rebuilt from the staged shell
  FirstInstall { promoted: usize },
  /// Prior snapshot found: unchanged entries were kept
  Upgraded {
    retained: usize,
    evicted: usize,
    promoted: usize,
  },
  /// Migration failed and every reserved store was deleted
  Reset { reason: String },
}

pub struct Migrator {
  config: WorkerConfig,
  storage: Arc<dyn CacheStorage>,
}

impl Migrator {
  pub fn new(config: WorkerConfig, storage: Arc<dyn CacheStorage>) -> Self {
    Self { config, storage }
  }

  /// Run the migration once. Failures are absorbed by a full reset;
  /// `Err` is returned only if the reset itself could not complete.
  pub async fn activate(&self) -> Result<ActivationOutcome> {
    match self.migrate().await {
      Ok(outcome) => Ok(outcome),
      Err(err) => {
        error!(error = %format!("{:#}", err), "failed to upgrade cache, resetting stores");
        self.reset().await?;
        Ok(ActivationOutcome::Reset {
          reason: format!("{:#}", err),
        })
      }
    }
  }

  /// Manifest persisted by the last successful activation.
  pub async fn read_snapshot(&self) -> Result<Option<ResourceManifest>> {
    let entry = self
      .storage
      .get(&self.config.stores.manifest, SNAPSHOT_KEY)
      .await?;

    entry
      .map(|e| ResourceManifest::from_json(&e.response.body))
      .transpose()
  }

  async fn migrate(&self) -> Result<ActivationOutcome> {
    let stores = &self.config.stores;
    let current = &self.config.manifest;

    self.storage.open(&stores.content).await?;
    self.storage.open(&stores.temp).await?;
    self.storage.open(&stores.manifest).await?;

    let Some(previous) = self.read_snapshot().await? else {
      // Without a snapshot nothing in Content can be trusted
      self.storage.delete_store(&stores.content).await?;
      self.storage.open(&stores.content).await?;
      let promoted = self.promote_temp().await?;
      self.write_snapshot().await?;

      info!(promoted, digest = %current.digest(), "first install activated");
      return Ok(ActivationOutcome::FirstInstall { promoted });
    };

    if previous.digest() == current.digest() {
      debug!("manifest unchanged since last activation");
    }

    let mut retained = 0;
    let mut evicted = 0;
    for key in self.storage.keys(&stores.content).await? {
      let path = self.config.resolver.entry_key(&key);
      let fresh = current.fingerprint(&path);
      if fresh.is_none() || fresh != previous.fingerprint(&path) {
        debug!(path = %path, "evicting stale entry");
        self.storage.delete(&stores.content, &key).await?;
        evicted += 1;
      } else {
        retained += 1;
      }
    }

    let promoted = self.promote_temp().await?;
    self.write_snapshot().await?;

    info!(
      retained,
      evicted,
      promoted,
      digest = %current.digest(),
      "cache upgraded"
    );
    Ok(ActivationOutcome::Upgraded {
      retained,
      evicted,
      promoted,
    })
  }

  /// Copy every staged entry into Content, then drop Temp.
  async fn promote_temp(&self) -> Result<usize> {
    let stores = &self.config.stores;
    let keys = self.storage.keys(&stores.temp).await?;

    for key in &keys {
      let entry = self
        .storage
        .get(&stores.temp, key)
        .await?
        .ok_or_else(|| eyre!("Staged entry {} vanished from {}", key, stores.temp))?;
      self
        .storage
        .put(&stores.content, key, &entry.response)
        .await?;
    }

    self.storage.delete_store(&stores.temp).await?;
    Ok(keys.len())
  }

  async fn write_snapshot(&self) -> Result<()> {
    let body = self.config.manifest.to_json()?;
    let response = AssetResponse::new(200, body).with_header("content-type", "application/json");
    self
      .storage
      .put(&self.config.stores.manifest, SNAPSHOT_KEY, &response)
      .await
  }

  /// Delete every reserved store, attempting all three before reporting.
  async fn reset(&self) -> Result<()> {
    let stores = &self.config.stores;
    let mut failed = Vec::new();

    for name in [&stores.content, &stores.temp, &stores.manifest] {
      if let Err(e) = self.storage.delete_store(name).await {
        warn!(store = %name, error = %e, "failed to delete store during reset");
        failed.push(name.as_str());
      }
    }

    if failed.is_empty() {
      Ok(())
    } else {
      Err(eyre!("Failed to reset stores: {}", failed.join(", ")))
    }
  }
}
