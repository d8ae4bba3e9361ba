//! Network fetch capability.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{CACHE_CONTROL, PRAGMA};

use crate::request::{AssetRequest, AssetResponse, CacheMode};

/// Performs live fetches on behalf of the worker.
///
/// `Err` means the fetch itself failed (connection refused, DNS, aborted).
/// Any HTTP status, including 4xx/5xx, is a successful fetch.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse>;
}

/// reqwest-backed network.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("precache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());

    if request.cache_mode == CacheMode::Reload {
      builder = builder
        .header(CACHE_CONTROL, "no-cache")
        .header(PRAGMA, "no-cache");
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    Ok(AssetResponse {
      status,
      headers,
      body,
    })
  }
}
