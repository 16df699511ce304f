//! Pools for the document database.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::DatabaseConfig;

/// How long a writer waits on another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to open {path}: {source}")]
    PoolCreationFailed {
        path: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("Failed to create database directory {path}: {source}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Open the file-backed pool named by `config`, creating the file and its
/// directory on first use.
///
/// Several CLI processes may drive different documents against one file, so
/// the pool runs in WAL mode and waits out short write locks.
pub async fn open_pool(config: &DatabaseConfig) -> Result<SqlitePool, ConnectionError> {
    let path = Path::new(&config.path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ConnectionError::DirectoryCreationFailed {
            path: parent.display().to_string(),
            source,
        })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect_with(options)
        .await
        .map_err(|source| ConnectionError::PoolCreationFailed {
            path: config.path.clone(),
            source,
        })
}

/// In-memory pool for tests.
pub async fn create_test_pool() -> Result<SqlitePool, ConnectionError> {
    let options = SqliteConnectOptions::new().filename(":memory:").foreign_keys(true);

    // A single connection keeps every query on the same in-memory database.
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(|source| ConnectionError::PoolCreationFailed {
            path: ":memory:".to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_pool_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("refine.db");
        let config = DatabaseConfig {
            path: path.display().to_string(),
            max_connections: 2,
        };

        let pool = open_pool(&config).await.unwrap();
        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_open_pool_reports_unusable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let config = DatabaseConfig {
            path: blocker.join("refine.db").display().to_string(),
            max_connections: 1,
        };

        let err = open_pool(&config).await.unwrap_err();
        assert!(matches!(err, ConnectionError::DirectoryCreationFailed { .. }), "{err}");
    }
}
