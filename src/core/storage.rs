//! Key-value storage using SQLite
//!
//! The conversation store keeps its whole collection as one JSON document
//! under a single key, so the backend only needs to get and set strings.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage quota exceeded: {size} bytes (limit {limit})")]
    QuotaExceeded { size: usize, limit: usize },
}

/// String values stored under string keys
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// SQLite-backed key-value storage
pub struct SqliteStorage {
    pool: SqlitePool,
    /// Largest value accepted, in bytes; 0 means unlimited
    quota_bytes: usize,
}

impl SqliteStorage {
    /// Open (or create) the SQLite database at `db_path`
    pub async fn new(db_path: &Path, quota_bytes: usize) -> Result<Self, StorageError> {
        // Create parent directories if they don't exist
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let storage = Self { pool, quota_bytes };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create an in-memory storage for testing
    pub async fn new_in_memory(quota_bytes: usize) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let storage = Self { pool, quota_bytes };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl KeyValueStorage for SqliteStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.quota_bytes > 0 && value.len() > self.quota_bytes {
            return Err(StorageError::QuotaExceeded {
                size: value.len(),
                limit: self.quota_bytes,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
