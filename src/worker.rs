//! The worker: one lifecycle-state object composing install, activation,
//! fetch routing and out-of-band messages.

use color_eyre::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::CacheStorage;
use crate::commands::{self, Message};
use crate::config::WorkerConfig;
use crate::installer::Installer;
use crate::migrator::{ActivationOutcome, Migrator};
use crate::network::Network;
use crate::prefetch::Prefetcher;
use crate::request::AssetRequest;
use crate::router::{Router, Routing};

/// Where the worker is in its host-driven lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
  /// Install or activation failed; the host discards this worker
  Redundant,
}

/// Result of handling an out-of-band message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
  Ignored,
  SkipWaiting,
  Prefetched { stored: usize },
}

/// Snapshot of the worker and its stores for reporting.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
  pub state: LifecycleState,
  pub manifest_digest: String,
  /// Digest of the manifest persisted by the last activation
  pub snapshot_digest: Option<String>,
  pub resources: usize,
  /// Names of every store the backend holds
  pub stores: Vec<String>,
  pub cached: usize,
  pub missing: usize,
  pub skip_waiting: bool,
  pub clients_claimed: bool,
}

pub struct ServiceWorker {
  config: WorkerConfig,
  storage: Arc<dyn CacheStorage>,
  installer: Installer,
  migrator: Migrator,
  router: Router,
  prefetcher: Prefetcher,
  state: RwLock<LifecycleState>,
  skip_waiting: AtomicBool,
  clients_claimed: AtomicBool,
}

impl ServiceWorker {
  pub fn new(
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
  ) -> Self {
    Self {
      installer: Installer::new(config.clone(), storage.clone(), network.clone()),
      migrator: Migrator::new(config.clone(), storage.clone()),
      router: Router::new(config.clone(), storage.clone(), network.clone()),
      prefetcher: Prefetcher::new(config.clone(), storage.clone(), network),
      config,
      storage,
      state: RwLock::new(LifecycleState::Parsed),
      skip_waiting: AtomicBool::new(false),
      clients_claimed: AtomicBool::new(false),
    }
  }

  pub fn config(&self) -> &WorkerConfig {
    &self.config
  }

  pub async fn state(&self) -> LifecycleState {
    *self.state.read().await
  }

  /// Whether the worker asked to take over without waiting.
  pub fn skip_waiting(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  /// Whether the worker claimed open clients after activating.
  pub fn clients_claimed(&self) -> bool {
    self.clients_claimed.load(Ordering::SeqCst)
  }

  /// Install signal: stage the application shell.
  ///
  /// A failure marks the worker redundant and is returned to the host.
  pub async fn install(&self) -> Result<usize> {
    self.skip_waiting.store(true, Ordering::SeqCst);
    self.set_state(LifecycleState::Installing).await;

    match self.installer.install().await {
      Ok(staged) => {
        self.set_state(LifecycleState::Installed).await;
        Ok(staged)
      }
      Err(err) => {
        warn!(error = %format!("{:#}", err), "install failed");
        self.set_state(LifecycleState::Redundant).await;
        Err(err)
      }
    }
  }

  /// Activate signal: migrate the content store to this deployment.
  ///
  /// If even the reset after a failed migration fails, the worker is
  /// marked redundant and the error is returned to the host.
  pub async fn activate(&self) -> Result<ActivationOutcome> {
    let state = self.state().await;
    if state != LifecycleState::Installed {
      debug!(?state, "activating without a completed install");
    }
    self.set_state(LifecycleState::Activating).await;

    let outcome = match self.migrator.activate().await {
      Ok(outcome) => outcome,
      Err(err) => {
        warn!(error = %format!("{:#}", err), "activation failed");
        self.set_state(LifecycleState::Redundant).await;
        return Err(err);
      }
    };
    if !matches!(outcome, ActivationOutcome::Reset { .. }) {
      self.clients_claimed.store(true, Ordering::SeqCst);
    }

    self.set_state(LifecycleState::Activated).await;
    Ok(outcome)
  }

  /// Fetch signal: route an intercepted request.
  pub async fn fetch(&self, request: &AssetRequest) -> Result<Routing> {
    self.router.handle(request).await
  }

  /// Message signal: handle a raw out-of-band message.
  pub async fn message(&self, raw: &str) -> Result<MessageOutcome> {
    match commands::parse(raw) {
      Some(Message::SkipWaiting) => {
        self.skip_waiting.store(true, Ordering::SeqCst);
        info!("skip waiting requested");
        Ok(MessageOutcome::SkipWaiting)
      }
      Some(Message::DownloadOffline) => {
        let stored = self.prefetcher.download_offline().await?;
        Ok(MessageOutcome::Prefetched { stored })
      }
      None => {
        debug!(message = raw, "ignoring unknown message");
        Ok(MessageOutcome::Ignored)
      }
    }
  }

  pub async fn status(&self) -> Result<WorkerStatus> {
    let stores = self.storage.store_names().await?;
    let cached = self.storage.keys(&self.config.stores.content).await?.len();
    let missing = self.prefetcher.missing().await?.len();
    let snapshot_digest = self.migrator.read_snapshot().await?.map(|m| m.digest());

    Ok(WorkerStatus {
      state: self.state().await,
      manifest_digest: self.config.manifest.digest(),
      snapshot_digest,
      resources: self.config.manifest.len(),
      stores,
      cached,
      missing,
      skip_waiting: self.skip_waiting(),
      clients_claimed: self.clients_claimed(),
    })
  }

  async fn set_state(&self, state: LifecycleState) {
    debug!(?state, "lifecycle transition");
    *self.state.write().await = state;
  }
}
