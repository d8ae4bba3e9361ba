//! Fetch interception: decide per request between cache-first and network-first.

use color_eyre::Result;
use reqwest::Method;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{CacheLayer, CacheResult, CacheStorage};
use crate::config::WorkerConfig;
use crate::network::Network;
use crate::path::ROOT_PATH;
use crate::request::{AssetRequest, AssetResponse};

/// Outcome of offering a request to the router.
#[derive(Debug)]
pub enum Routing {
  /// Not ours; the host serves it with its default handling
  PassThrough,
  /// Served by the worker
  Respond(CacheResult<AssetResponse>),
}

impl Routing {
  pub fn response(&self) -> Option<&AssetResponse> {
    match self {
      Routing::Respond(result) => Some(&result.data),
      Routing::PassThrough => None,
    }
  }
}

pub struct Router {
  config: WorkerConfig,
  content: CacheLayer,
  network: Arc<dyn Network>,
}

impl Router {
  pub fn new(
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
  ) -> Self {
    let content = CacheLayer::new(storage, config.stores.content.clone());
    Self {
      config,
      content,
      network,
    }
  }

  /// Logical path to serve this request under, or `None` to let it through.
  pub fn route_key(&self, request: &AssetRequest) -> Option<String> {
    if request.method != Method::GET {
      return None;
    }
    let key = self.config.resolver.route_key(&request.url);
    self.config.manifest.contains(&key).then_some(key)
  }

  /// Serve a request: network-first for the root document, cache-first
  /// for every other manifest resource.
  pub async fn handle(&self, request: &AssetRequest) -> Result<Routing> {
    let Some(key) = self.route_key(request) else {
      debug!(method = %request.method, url = %request.url, "passing through");
      return Ok(Routing::PassThrough);
    };

    let network = &self.network;
    let fetch = || async move { network.fetch(request).await };

    let result = if key == ROOT_PATH {
      self.content.fetch_network_first(&key, fetch).await?
    } else {
      self.content.fetch_cache_first(&key, fetch).await?
    };

    debug!(key = %key, source = ?result.source, status = result.data.status, "served");
    Ok(Routing::Respond(result))
  }
}
