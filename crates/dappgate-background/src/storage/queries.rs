//! Database queries for the `kv_store` table.

use dappgate_core::db::unix_timestamp;

use super::db::{Database, DatabaseError};

impl Database {
    /// Get the raw JSON text stored under `key`.
    pub async fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|(value,)| value))
    }

    /// Insert or replace the value stored under `key`.
    pub async fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            r"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_roundtrip() {
        let db = Database::open_in_memory().await.unwrap();

        assert!(db.kv_get("connectedSites").await.unwrap().is_none());
        db.kv_set("connectedSites", "[]").await.unwrap();
        assert_eq!(
            db.kv_get("connectedSites").await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn set_overwrites_existing_key() {
        let db = Database::open_in_memory().await.unwrap();

        db.kv_set("selectedNetwork", "1").await.unwrap();
        db.kv_set("selectedNetwork", "137").await.unwrap();

        assert_eq!(
            db.kv_get("selectedNetwork").await.unwrap().as_deref(),
            Some("137")
        );
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.db");

        {
            let db = Database::open(&path).await.unwrap();
            db.kv_set("selectedNetwork", r#"{"chainId":10}"#).await.unwrap();
            db.pool().close().await;
        }

        let db = Database::open(&path).await.unwrap();
        assert_eq!(
            db.kv_get("selectedNetwork").await.unwrap().as_deref(),
            Some(r#"{"chainId":10}"#)
        );
    }
}
