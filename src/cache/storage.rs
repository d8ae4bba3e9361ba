//! SQLite cache storage implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::{CacheStorage, CachedEntry};
use crate::request::AssetResponse;

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Create a new SQLite storage at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Create a new SQLite storage at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Storage that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("precache").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  fn open_blocking(&self, store: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_store(&conn, store)
  }

  fn has_store_blocking(&self, store: &str) -> Result<bool> {
    let conn = self.lock()?;
    let found: Option<i64> = conn
      .query_row(
        "SELECT 1 FROM stores WHERE name = ?",
        params![store],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up store {}: {}", store, e))?;
    Ok(found.is_some())
  }

  fn store_names_blocking(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM stores ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list stores: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read store name: {}", e))?;

    Ok(names)
  }

  fn keys_blocking(&self, store: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT entry_key FROM entries WHERE store = ? ORDER BY entry_key")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![store], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list keys of {}: {}", store, e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read entry key: {}", e))?;

    Ok(keys)
  }

  fn get_blocking(&self, store: &str, key: &str) -> Result<Option<CachedEntry>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, cached_at FROM entries
         WHERE store = ? AND entry_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String)> = stmt
      .query_row(params![store, key], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .optional()
      .map_err(|e| eyre!("Failed to read entry {} from {}: {}", key, store, e))?;

    match row {
      Some((status, headers, body, cached_at_str)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers of {}: {}", key, e))?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(CachedEntry {
          response: AssetResponse {
            status,
            headers,
            body: body.into(),
          },
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put_blocking(&self, store: &str, key: &str, response: &AssetResponse) -> Result<()> {
    let conn = self.lock()?;
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    ensure_store(&conn, store)?;
    conn
      .execute(
        "INSERT OR REPLACE INTO entries (store, entry_key, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))",
        params![store, key, response.status, headers, response.body.as_ref()],
      )
      .map_err(|e| eyre!("Failed to store entry {} in {}: {}", key, store, e))?;

    Ok(())
  }

  fn put_all_blocking(&self, store: &str, entries: &[(String, AssetResponse)]) -> Result<()> {
    let mut conn = self.lock()?;
    // Dropping the transaction without commit rolls every write back
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_store(&tx, store)?;
    for (key, response) in entries {
      let headers = serde_json::to_string(&response.headers)
        .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;
      tx.execute(
        "INSERT OR REPLACE INTO entries (store, entry_key, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))",
        params![store, key, response.status, headers, response.body.as_ref()],
      )
      .map_err(|e| eyre!("Failed to store entry {} in {}: {}", key, store, e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn delete_blocking(&self, store: &str, key: &str) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn
      .execute(
        "DELETE FROM entries WHERE store = ? AND entry_key = ?",
        params![store, key],
      )
      .map_err(|e| eyre!("Failed to delete entry {} from {}: {}", key, store, e))?;
    Ok(removed > 0)
  }

  fn delete_store_blocking(&self, store: &str) -> Result<bool> {
    let conn = self.lock()?;
    // Entries go with the store via ON DELETE CASCADE
    let removed = conn
      .execute("DELETE FROM stores WHERE name = ?", params![store])
      .map_err(|e| eyre!("Failed to delete store {}: {}", store, e))?;
    Ok(removed > 0)
  }
}

fn ensure_store(conn: &Connection, store: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO stores (name) VALUES (?)",
      params![store],
    )
    .map_err(|e| eyre!("Failed to open store {}: {}", store, e))?;
  Ok(())
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Named stores
CREATE TABLE IF NOT EXISTS stores (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Cached responses keyed by logical path
CREATE TABLE IF NOT EXISTS entries (
    store TEXT NOT NULL,
    entry_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store, entry_key),
    FOREIGN KEY (store) REFERENCES stores(name) ON DELETE CASCADE
);
"#;

#[async_trait]
impl CacheStorage for SqliteStorage {
  async fn open(&self, store: &str) -> Result<()> {
    self.open_blocking(store)
  }

  async fn has_store(&self, store: &str) -> Result<bool> {
    self.has_store_blocking(store)
  }

  async fn store_names(&self) -> Result<Vec<String>> {
    self.store_names_blocking()
  }

  async fn keys(&self, store: &str) -> Result<Vec<String>> {
    self.keys_blocking(store)
  }

  async fn get(&self, store: &str, key: &str) -> Result<Option<CachedEntry>> {
    self.get_blocking(store, key)
  }

  async fn put(&self, store: &str, key: &str, response: &AssetResponse) -> Result<()> {
    self.put_blocking(store, key, response)
  }

  async fn put_all(&self, store: &str, entries: &[(String, AssetResponse)]) -> Result<()> {
    self.put_all_blocking(store, entries)
  }

  async fn delete(&self, store: &str, key: &str) -> Result<bool> {
    self.delete_blocking(store, key)
  }

  async fn delete_store(&self, store: &str) -> Result<bool> {
    self.delete_store_blocking(store)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[tokio::test]
  async fn test_entry_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    {
      let storage = SqliteStorage::open_at(&path).unwrap();
      let response = AssetResponse::new(200, "body").with_header("content-type", "text/html");
      storage.put("content", "/", &response).await.unwrap();
    }

    let storage = SqliteStorage::open_at(&path).unwrap();
    let entry = storage.get("content", "/").await.unwrap().unwrap();
    assert_eq!(entry.response.status, 200);
    assert_eq!(entry.response.body.as_ref(), b"body");
    assert_eq!(entry.response.header("Content-Type"), Some("text/html"));
  }

  #[tokio::test]
  async fn test_delete_store_cascades() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .put("temp", "index.html", &AssetResponse::new(200, "i"))
      .await
      .unwrap();
    storage
      .put("content", "index.html", &AssetResponse::new(200, "c"))
      .await
      .unwrap();

    assert!(storage.delete_store("temp").await.unwrap());
    assert!(!storage.has_store("temp").await.unwrap());
    assert!(storage.keys("temp").await.unwrap().is_empty());
    assert_eq!(storage.keys("content").await.unwrap(), vec!["index.html"]);

    // Recreating the store starts empty
    storage.open("temp").await.unwrap();
    assert!(storage.has_store("temp").await.unwrap());
    assert!(storage.keys("temp").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_put_replaces_existing_entry() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .put("content", "main.js", &AssetResponse::new(200, "v1"))
      .await
      .unwrap();
    storage
      .put("content", "main.js", &AssetResponse::new(200, "v2"))
      .await
      .unwrap();

    let entry = storage.get("content", "main.js").await.unwrap().unwrap();
    assert_eq!(entry.response.body.as_ref(), b"v2");
    assert_eq!(storage.keys("content").await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_store_names_and_delete() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.open("b").await.unwrap();
    storage.open("a").await.unwrap();
    assert_eq!(storage.store_names().await.unwrap(), vec!["a", "b"]);

    storage
      .put("a", "k", &AssetResponse::new(200, "x"))
      .await
      .unwrap();
    assert!(storage.delete("a", "k").await.unwrap());
    assert!(!storage.delete("a", "k").await.unwrap());
  }

  #[tokio::test]
  async fn test_put_all_is_one_transaction() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .put("temp", "a.js", &AssetResponse::new(200, "old"))
      .await
      .unwrap();

    let entries = vec![
      ("a.js".to_string(), AssetResponse::new(200, "new")),
      ("b.js".to_string(), AssetResponse::new(200, "b")),
    ];
    storage.put_all("temp", &entries).await.unwrap();

    assert_eq!(storage.keys("temp").await.unwrap(), vec!["a.js", "b.js"]);
    let entry = storage.get("temp", "a.js").await.unwrap().unwrap();
    assert_eq!(entry.response.body.as_ref(), b"new");

    // A failing statement mid-batch leaves nothing behind
    storage
      .lock()
      .unwrap()
      .execute_batch(
        "CREATE TRIGGER reject_c BEFORE INSERT ON entries WHEN NEW.entry_key = 'c.js'
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
      )
      .unwrap();
    let entries = vec![
      ("a.js".to_string(), AssetResponse::new(200, "newer")),
      ("c.js".to_string(), AssetResponse::new(200, "c")),
    ];
    assert!(storage.put_all("temp", &entries).await.is_err());

    assert_eq!(storage.keys("temp").await.unwrap(), vec!["a.js", "b.js"]);
    let entry = storage.get("temp", "a.js").await.unwrap().unwrap();
    assert_eq!(entry.response.body.as_ref(), b"new");
  }

  #[test]
  fn test_parse_datetime() {
    let dt = parse_datetime("2024-05-01 12:30:00").unwrap();
    assert_eq!(dt.to_rfc3339(), "2024-05-01T12:30:00+00:00");
    assert!(parse_datetime("yesterday").is_err());
  }
}
