// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Durable blob storage for the cache snapshot, change tokens and payloads.

mod fs;
mod sqlite;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, StorageKind};

pub use crate::storage::fs::FsBlobStore;
pub use crate::storage::sqlite::SqliteBlobStore;

/// Errors of the blob storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// SQLite failure.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// Migration failure.
    #[error("Failed to run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// File system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The key cannot be stored by this backend.
    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    /// The backend is misconfigured.
    #[error("Storage configuration error: {0}")]
    Config(String),
}

/// Key-value store of opaque blobs.
///
/// A completed [`BlobStore::write_blob`] must be visible to a later
/// [`BlobStore::read_blob`], also after a process restart. There is no
/// transactional guarantee across keys.
#[async_trait]
pub trait BlobStore: fmt::Debug + Send + Sync {
    /// Reads a blob, `None` if it does not exist.
    async fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Creates or replaces a blob.
    async fn write_blob(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Deletes a blob. Deleting a missing blob succeeds.
    async fn delete_blob(&self, key: &str) -> Result<(), StorageError>;
}

/// Opens the blob store selected by the configuration.
///
/// # Errors
///
/// Returns an error if the backend cannot be opened.
pub async fn open_blob_store(config: &Config) -> Result<Arc<dyn BlobStore>, StorageError> {
    const DB_NAME: &str = "trailsync.db";
    const BLOB_DIR: &str = "blobs";

    match config.storage {
        StorageKind::Sqlite => {
            let path = match &config.state_dir {
                Some(dir) => {
                    tokio::fs::create_dir_all(dir).await?;
                    Some(dir.join(DB_NAME))
                }
                None => None,
            };
            let store = SqliteBlobStore::open(path.as_deref()).await?;
            Ok(Arc::new(store))
        }
        StorageKind::Files => {
            let dir = config.state_dir.as_ref().ok_or_else(|| {
                StorageError::Config("file storage requires a state directory".to_string())
            })?;
            let store = FsBlobStore::open(dir.join(BLOB_DIR)).await?;
            Ok(Arc::new(store))
        }
    }
}
