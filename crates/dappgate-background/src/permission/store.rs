//! Mutex-guarded permission store persisted under `connectedSites`.
//!
//! Every mutation runs under one async mutex: the working copy is changed,
//! the whole site list is written to the key-value store, and only then is
//! the in-memory map replaced. Concurrent approvals for different origins
//! therefore never overwrite each other, and a failed write leaves both the
//! map and storage exactly as they were.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use dappgate_core::db::unix_timestamp;

use super::types::{ConnectedSite, StoreError};
use crate::storage::{KeyValueStore, keys};

/// Durable `origin → ConnectedSite` map.
pub struct PermissionStore {
    kv: Arc<dyn KeyValueStore>,
    sites: Mutex<BTreeMap<String, ConnectedSite>>,
}

impl PermissionStore {
    /// Load the store from `connectedSites`, starting empty if absent.
    pub async fn load(kv: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let sites = match kv.get(keys::CONNECTED_SITES).await? {
            Some(value) => decode_sites(value)?,
            None => BTreeMap::new(),
        };

        info!(count = sites.len(), "Loaded connected sites");

        Ok(Self {
            kv,
            sites: Mutex::new(sites),
        })
    }

    /// Get the record for `origin`.
    pub async fn get(&self, origin: &str) -> Option<ConnectedSite> {
        self.sites.lock().await.get(origin).cloned()
    }

    /// All records, oldest connection first.
    pub async fn list_all(&self) -> Vec<ConnectedSite> {
        sorted(&*self.sites.lock().await)
    }

    /// Whether `origin` holds the capability `tag`.
    pub async fn has_permission(&self, origin: &str, tag: &str) -> bool {
        self.sites
            .lock()
            .await
            .get(origin)
            .is_some_and(|s| s.has_permission(tag))
    }

    /// Insert or replace the record for `site.origin`.
    ///
    /// An existing record keeps its `connected_at`, so re-approval never
    /// looks like a fresh connection. Returns the stored record.
    pub async fn upsert(&self, mut site: ConnectedSite) -> Result<ConnectedSite, StoreError> {
        self.mutate(|sites| {
            if let Some(existing) = sites.get(&site.origin) {
                site.connected_at = existing.connected_at;
            }
            sites.insert(site.origin.clone(), site.clone());
            site
        })
        .await
        .inspect(|site| {
            debug!(origin = %site.origin, account = %site.account, chain_id = site.chain_id, "Site upserted");
        })
    }

    /// Delete the record for `origin`, returning it if present.
    pub async fn remove(&self, origin: &str) -> Result<Option<ConnectedSite>, StoreError> {
        if !self.sites.lock().await.contains_key(origin) {
            return Ok(None);
        }
        let removed = self.mutate(|sites| sites.remove(origin)).await?;
        if removed.is_some() {
            info!(origin, "Site disconnected");
        }
        Ok(removed)
    }

    /// Refresh `last_used` for `origin`. Returns `false` if not connected.
    pub async fn touch(&self, origin: &str) -> Result<bool, StoreError> {
        if !self.sites.lock().await.contains_key(origin) {
            return Ok(false);
        }
        self.mutate(|sites| {
            sites.get_mut(origin).is_some_and(|site| {
                site.last_used = unix_timestamp();
                true
            })
        })
        .await
    }

    /// Point every site at `chain_id`. Returns the records that moved.
    pub async fn set_chain_for_all(&self, chain_id: u64) -> Result<Vec<ConnectedSite>, StoreError> {
        self.update_all(|site| site.chain_id != chain_id, |site| site.chain_id = chain_id)
            .await
    }

    /// Expose `account` to every site. Returns the records that changed.
    pub async fn set_account_for_all(
        &self,
        account: &str,
    ) -> Result<Vec<ConnectedSite>, StoreError> {
        self.update_all(
            |site| site.account != account,
            |site| site.account = account.to_string(),
        )
        .await
    }

    /// Apply `update` to every site matching `stale`; writes nothing if none do.
    async fn update_all(
        &self,
        stale: impl Fn(&ConnectedSite) -> bool,
        update: impl Fn(&mut ConnectedSite),
    ) -> Result<Vec<ConnectedSite>, StoreError> {
        if !self.sites.lock().await.values().any(&stale) {
            return Ok(Vec::new());
        }
        self.mutate(|sites| {
            let now = unix_timestamp();
            let mut changed = BTreeMap::new();
            for site in sites.values_mut() {
                if !stale(site) {
                    continue;
                }
                update(site);
                site.last_used = now;
                changed.insert(site.origin.clone(), site.clone());
            }
            sorted(&changed)
        })
        .await
    }

    /// Apply `f` to a working copy, persist it, then publish it.
    #[allow(clippy::significant_drop_tightening)]
    async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, ConnectedSite>) -> R,
    ) -> Result<R, StoreError> {
        let mut guard = self.sites.lock().await;
        let mut working = guard.clone();
        let out = f(&mut working);

        let value = serde_json::to_value(sorted(&working)).map_err(|e| StoreError::Corrupt {
            key: keys::CONNECTED_SITES.to_string(),
            reason: e.to_string(),
        })?;
        if let Err(e) = self.kv.set(keys::CONNECTED_SITES, &value).await {
            warn!(error = %e, "Failed to persist connected sites; change discarded");
            return Err(e.into());
        }

        *guard = working;
        Ok(out)
    }
}

fn decode_sites(value: Value) -> Result<BTreeMap<String, ConnectedSite>, StoreError> {
    let list: Vec<ConnectedSite> =
        serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
            key: keys::CONNECTED_SITES.to_string(),
            reason: e.to_string(),
        })?;
    // Last record wins if an older build persisted duplicates.
    Ok(list.into_iter().map(|s| (s.origin.clone(), s)).collect())
}

fn sorted(sites: &BTreeMap<String, ConnectedSite>) -> Vec<ConnectedSite> {
    let mut list: Vec<ConnectedSite> = sites.values().cloned().collect();
    list.sort_by(|a, b| {
        a.connected_at
            .cmp(&b.connected_at)
            .then_with(|| a.origin.cmp(&b.origin))
    });
    list
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    async fn store_with(kv: Arc<MemoryStore>) -> PermissionStore {
        PermissionStore::load(kv).await.unwrap()
    }

    #[tokio::test]
    async fn starts_empty() {
        let store = store_with(Arc::new(MemoryStore::new())).await;
        assert!(store.list_all().await.is_empty());
        assert!(store.get("https://a.example").await.is_none());
    }

    #[tokio::test]
    async fn upsert_persists_before_returning() {
        let kv = Arc::new(MemoryStore::new());
        let store = store_with(Arc::clone(&kv)).await;

        store
            .upsert(ConnectedSite::new("https://a.example", "0xaaa", 1))
            .await
            .unwrap();

        let persisted = kv.get(keys::CONNECTED_SITES).await.unwrap().unwrap();
        assert_eq!(persisted[0]["origin"], "https://a.example");
        assert_eq!(persisted[0]["chainId"], 1);
        assert_eq!(persisted[0]["permissions"], json!(["connected"]));
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_origin_and_keeps_connected_at() {
        let store = store_with(Arc::new(MemoryStore::new())).await;

        let mut first = ConnectedSite::new("https://a.example", "0xaaa", 1);
        first.connected_at = 1_000;
        store.upsert(first).await.unwrap();

        let second = ConnectedSite::new("https://a.example", "0xbbb", 137);
        let stored = store.upsert(second).await.unwrap();

        assert_eq!(store.list_all().await.len(), 1);
        assert_eq!(stored.connected_at, 1_000);
        assert_eq!(stored.account, "0xbbb");
        assert_eq!(stored.chain_id, 137);
    }

    #[tokio::test]
    async fn failed_write_leaves_state_untouched() {
        let kv = Arc::new(MemoryStore::new());
        let store = store_with(Arc::clone(&kv)).await;
        store
            .upsert(ConnectedSite::new("https://a.example", "0xaaa", 1))
            .await
            .unwrap();

        kv.set_fail_writes(true);
        let result = store
            .upsert(ConnectedSite::new("https://b.example", "0xbbb", 1))
            .await;
        assert!(matches!(result, Err(StoreError::Storage(_))));
        assert!(store.set_chain_for_all(137).await.is_err());

        assert!(store.get("https://b.example").await.is_none());
        assert_eq!(store.get("https://a.example").await.unwrap().chain_id, 1);
    }

    #[tokio::test]
    async fn remove_deletes_and_reports() {
        let store = store_with(Arc::new(MemoryStore::new())).await;
        store
            .upsert(ConnectedSite::new("https://a.example", "0xaaa", 1))
            .await
            .unwrap();

        assert!(store.remove("https://a.example").await.unwrap().is_some());
        assert!(store.remove("https://a.example").await.unwrap().is_none());
        assert!(!store.has_permission("https://a.example", "connected").await);
    }

    #[tokio::test]
    async fn bulk_update_reports_only_changed_sites() {
        let kv = Arc::new(MemoryStore::new());
        let store = store_with(Arc::clone(&kv)).await;
        store
            .upsert(ConnectedSite::new("https://a.example", "0xaaa", 1))
            .await
            .unwrap();
        store
            .upsert(ConnectedSite::new("https://b.example", "0xaaa", 137))
            .await
            .unwrap();

        let moved = store.set_chain_for_all(137).await.unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].origin, "https://a.example");

        // Nothing left to change: no write at all.
        kv.set_fail_writes(true);
        assert!(store.set_chain_for_all(137).await.unwrap().is_empty());
        assert!(store.set_account_for_all("0xaaa").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn touch_ignores_unknown_origins() {
        let kv = Arc::new(MemoryStore::new());
        let store = store_with(Arc::clone(&kv)).await;

        assert!(!store.touch("https://nobody.example").await.unwrap());
        assert!(kv.get(keys::CONNECTED_SITES).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reload_restores_records() {
        let kv = Arc::new(MemoryStore::new());
        {
            let store = store_with(Arc::clone(&kv)).await;
            store
                .upsert(ConnectedSite::new("https://a.example", "0xaaa", 10))
                .await
                .unwrap();
        }

        let store = store_with(kv).await;
        let site = store.get("https://a.example").await.expect("site reloaded");
        assert_eq!(site.chain_id, 10);
    }

    #[tokio::test]
    async fn concurrent_upserts_for_different_origins_both_land() {
        let kv = Arc::new(MemoryStore::new());
        let store = Arc::new(store_with(Arc::clone(&kv)).await);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .upsert(ConnectedSite::new(
                            format!("https://site{i}.example"),
                            "0xaaa",
                            1,
                        ))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.list_all().await.len(), 16);
        let reloaded = PermissionStore::load(kv).await.unwrap();
        assert_eq!(reloaded.list_all().await.len(), 16);
    }

    #[tokio::test]
    async fn corrupt_state_fails_to_load() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(keys::CONNECTED_SITES, &json!({"not": "a list"}))
            .await
            .unwrap();
        assert!(matches!(
            PermissionStore::load(kv).await,
            Err(StoreError::Corrupt { .. })
        ));
    }
}
