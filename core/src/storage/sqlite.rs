// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use jiff::Timestamp;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::storage::{BlobStore, StorageError};

/// Blob store backed by a single SQLite table.
#[derive(Debug, Clone)]
pub struct SqliteBlobStore {
    pool: SqlitePool,
}

impl SqliteBlobStore {
    /// Opens a sqlite database connection.
    /// If `filename` is `None`, it opens an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(filename: Option<&Path>) -> Result<Self, StorageError> {
        let options = if let Some(filename) = filename {
            tracing::info!(path = %filename.display(), "connecting to SQLite database");
            SqliteConnectOptions::new()
                .filename(filename)
                .create_if_missing(true)
        } else {
            tracing::info!("connecting to in-memory SQLite database");
            // Each parse yields a fresh shared-cache database for all connections of the pool.
            SqliteConnectOptions::from_str("sqlite::memory:")?
        };

        // Keep one connection alive so a shared in-memory database is not dropped.
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("src/storage/migrations") // relative path from the crate root
            .run(&pool)
            .await?;

        tracing::debug!("blob table ready");
        Ok(Self { pool })
    }

    /// Closes the database connection.
    pub async fn close(self) {
        tracing::debug!("closing database connection");
        self.pool.close().await;
    }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    async fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        const SQL: &str = "SELECT value FROM blobs WHERE key = ?;";

        let row: Option<(Vec<u8>,)> = sqlx::query_as(SQL)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn write_blob(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        const SQL: &str = "\
INSERT INTO blobs (key, value, updated_at)
VALUES (?, ?, ?)
ON CONFLICT(key) DO UPDATE SET
    value      = excluded.value,
    updated_at = excluded.updated_at;
";

        sqlx::query(SQL)
            .bind(key)
            .bind(bytes)
            .bind(Timestamp::now().to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_blob(&self, key: &str) -> Result<(), StorageError> {
        const SQL: &str = "DELETE FROM blobs WHERE key = ?;";

        sqlx::query(SQL).bind(key).execute(&self.pool).await?;
        Ok(())
    }
}
