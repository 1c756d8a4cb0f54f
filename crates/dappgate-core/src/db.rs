//! `SQLite` pool setup for the background key-value store.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

/// Database errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(e: sqlx::Error) -> Self {
        Self::Query(e.to_string())
    }
}

/// Where the wallet database lives.
#[derive(Debug, Clone, Copy)]
pub enum DbLocation<'a> {
    /// On-disk file; parent directories are created on open.
    File(&'a Path),
    /// Private in-memory database on a single connection.
    Memory,
}

/// Open a WAL-mode pool at `location`.
pub async fn open_pool(location: DbLocation<'_>) -> Result<SqlitePool, DatabaseError> {
    let (options, max_connections) = match location {
        DbLocation::File(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io(e.to_string()))?;
            }
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .busy_timeout(Duration::from_secs(5));
            (options, 4)
        }
        DbLocation::Memory => (SqliteConnectOptions::new().in_memory(true), 1),
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options.journal_mode(SqliteJournalMode::Wal))
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;

    if let DbLocation::File(path) = location {
        info!(path = %path.display(), "Database opened");
    }
    Ok(pool)
}

/// Current time as Unix seconds.
#[allow(clippy::cast_possible_wrap)]
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unix_timestamp_is_reasonable() {
        // After 2024-01-01
        assert!(unix_timestamp() > 1_704_067_200);
    }

    #[tokio::test]
    async fn memory_pool_opens() {
        assert!(open_pool(DbLocation::Memory).await.is_ok());
    }

    #[tokio::test]
    async fn file_pool_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("wallet.db");
        assert!(open_pool(DbLocation::File(&path)).await.is_ok());
        assert!(path.exists());
    }
}
