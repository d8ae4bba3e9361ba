//! Named response stores and the caching strategies built on them.
//!
//! This module provides the storage capability the worker runs against:
//! - Named stores of logical path to response, behind `CacheStorage`
//! - In-memory and SQLite backends
//! - Cache-first, network-first and all-or-nothing batch population

mod layer;
mod memory;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use memory::MemoryStorage;
pub use storage::SqliteStorage;
pub use traits::{CacheResult, CacheSource, CacheStorage, CachedEntry};
