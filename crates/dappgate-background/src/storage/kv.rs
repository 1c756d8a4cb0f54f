//! `KeyValueStore` trait and its implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::db::{Database, DatabaseError};

/// Persisted keys.
pub mod keys {
    pub const CONNECTED_SITES: &str = "connectedSites";
    pub const SELECTED_NETWORK: &str = "selectedNetwork";
    pub const CUSTOM_NETWORKS: &str = "customNetworks";
}

/// Durable JSON key-value storage.
///
/// A successful `set` must be durable before it returns; callers rely on
/// reading their own writes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, DatabaseError>;
    async fn set(&self, key: &str, value: &Value) -> Result<(), DatabaseError>;
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> Result<Option<Value>, DatabaseError> {
        match self.kv_get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("corrupt value under {key}: {e}"))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), DatabaseError> {
        self.kv_set(key, &value.to_string()).await
    }
}

/// In-memory store for tests and ephemeral hosts.
///
/// `set_fail_writes(true)` makes every subsequent write fail, which lets
/// tests exercise rollback paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), DatabaseError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Io("write rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, DatabaseError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), DatabaseError> {
        self.check_writable()?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}
