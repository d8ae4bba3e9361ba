//! Manifest-driven asset precache.
//!
//! A worker stages an application shell on install, reconciles the durable
//! content store against the previous deployment's manifest on activation,
//! and serves manifest resources cache-first (the root document
//! network-first) once active.

pub mod cache;
pub mod commands;
pub mod config;
pub mod event;
pub mod installer;
pub mod manifest;
pub mod migrator;
pub mod network;
pub mod path;
pub mod prefetch;
pub mod request;
pub mod router;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{Config, StoreNames, WorkerConfig};
pub use manifest::ResourceManifest;
pub use worker::ServiceWorker;
