//! Wallet database handle.

use std::path::Path;

use sqlx::SqlitePool;
use tracing::debug;

use dappgate_core::db::{DbLocation, open_pool};

pub use dappgate_core::db::DatabaseError;

/// `SQLite` database holding the `kv_store` table.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create the database file at `path` and migrate it.
    pub async fn open(path: &Path) -> Result<Self, DatabaseError> {
        Self::migrated(open_pool(DbLocation::File(path)).await?).await
    }

    /// Open a throwaway in-memory database.
    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::migrated(open_pool(DbLocation::Memory).await?).await
    }

    pub(crate) const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, DatabaseError> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        debug!("kv_store schema ready");
        Ok(Self { pool })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_migrates() {
        let db = Database::open_in_memory().await;
        assert!(db.is_ok());
    }
}
