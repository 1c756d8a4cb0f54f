//! Fan-out of provider events to connected tabs.
//!
//! The permission store is updated before any event is pushed, so a page
//! that reacts to `chainChanged` by calling `eth_chainId` reads the new
//! value. Delivery is all-settled: one slow or closed tab never blocks or
//! fails the others.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use dappgate_core::origin::origin_of;
use dappgate_core::protocol::{ProviderEvent, RpcError};
use dappgate_core::format_chain_id;

use super::types::{BroadcastReport, TabMessenger};
use crate::permission::{PermissionStore, StoreError};

/// Pushes chain, account and disconnect events to page contexts.
pub struct NotificationBroadcaster {
    store: Arc<PermissionStore>,
    messenger: Arc<dyn TabMessenger>,
    delivery_timeout: Duration,
}

impl NotificationBroadcaster {
    pub fn new(
        store: Arc<PermissionStore>,
        messenger: Arc<dyn TabMessenger>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            store,
            messenger,
            delivery_timeout,
        }
    }

    /// Point every connected site at `chain_id` and push `chainChanged`.
    pub async fn broadcast_chain_changed(
        &self,
        chain_id: u64,
    ) -> Result<BroadcastReport, StoreError> {
        let sites = self.store.set_chain_for_all(chain_id).await?;
        let origins: HashSet<String> = sites.into_iter().map(|s| s.origin).collect();
        let event = ProviderEvent::ChainChanged {
            chain_id: format_chain_id(chain_id),
        };
        let report = self.fan_out(&origins, &event).await;
        info!(
            chain_id,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Broadcast chainChanged"
        );
        Ok(report)
    }

    /// Expose `account` to every connected site and push `accountsChanged`.
    pub async fn broadcast_account_changed(
        &self,
        account: &str,
    ) -> Result<BroadcastReport, StoreError> {
        let sites = self.store.set_account_for_all(account).await?;
        let origins: HashSet<String> = sites.into_iter().map(|s| s.origin).collect();
        let event = ProviderEvent::AccountsChanged {
            accounts: vec![account.to_string()],
        };
        let report = self.fan_out(&origins, &event).await;
        info!(
            account,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Broadcast accountsChanged"
        );
        Ok(report)
    }

    /// Push `disconnect` to the tabs of `origin`.
    ///
    /// The caller removes the site from the store first.
    pub async fn notify_disconnect(&self, origin: &str) -> BroadcastReport {
        let origins = HashSet::from([origin.to_string()]);
        let event = ProviderEvent::Disconnect {
            error: RpcError::disconnected("Site disconnected"),
        };
        let report = self.fan_out(&origins, &event).await;
        info!(
            origin,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Notified disconnect"
        );
        report
    }

    async fn fan_out(&self, origins: &HashSet<String>, event: &ProviderEvent) -> BroadcastReport {
        if origins.is_empty() {
            return BroadcastReport::default();
        }

        let tabs = match self.messenger.tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!(error = %e, event = event.event_name(), "Failed to list tabs");
                return BroadcastReport::default();
            }
        };

        let envelope = event.to_envelope();
        let targets = tabs
            .into_iter()
            .filter(|tab| origin_of(&tab.url).is_some_and(|o| origins.contains(&o)));

        let deliveries = targets.map(|tab| {
            let envelope = &envelope;
            async move {
                let sent = tokio::time::timeout(
                    self.delivery_timeout,
                    self.messenger.send(tab.id, envelope),
                )
                .await;
                match sent {
                    Ok(Ok(())) => Ok(tab.id),
                    Ok(Err(e)) => {
                        debug!(tab_id = tab.id, error = %e, "Delivery failed");
                        Err(tab.id)
                    }
                    Err(_) => {
                        debug!(tab_id = tab.id, "Delivery timed out");
                        Err(tab.id)
                    }
                }
            }
        });

        let mut report = BroadcastReport::default();
        for result in join_all(deliveries).await {
            match result {
                Ok(tab_id) => report.delivered.push(tab_id),
                Err(tab_id) => report.failed.push(tab_id),
            }
        }
        if !report.failed.is_empty() {
            warn!(
                event = event.event_name(),
                failed = ?report.failed,
                "Some tabs did not receive the event"
            );
        }
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::permission::ConnectedSite;
    use crate::storage::MemoryStore;
    use crate::testing::RecordingMessenger;

    async fn setup(
        messenger: Arc<RecordingMessenger>,
    ) -> (NotificationBroadcaster, Arc<PermissionStore>) {
        let store = Arc::new(
            PermissionStore::load(Arc::new(MemoryStore::new()))
                .await
                .unwrap(),
        );
        for origin in ["https://a.example", "https://b.example"] {
            store
                .upsert(ConnectedSite::new(origin, "0xaaa", 1))
                .await
                .unwrap();
        }
        let broadcaster =
            NotificationBroadcaster::new(Arc::clone(&store), messenger, Duration::from_secs(2));
        (broadcaster, store)
    }

    #[tokio::test]
    async fn chain_change_reaches_every_connected_tab() {
        let messenger = Arc::new(RecordingMessenger::new());
        messenger.open_tab(1, "https://a.example/app").await;
        messenger.open_tab(2, "https://b.example/").await;
        messenger.open_tab(3, "https://stranger.example/").await;
        let (broadcaster, store) = setup(Arc::clone(&messenger)).await;

        let report = broadcaster.broadcast_chain_changed(137).await.unwrap();

        let mut delivered = report.delivered.clone();
        delivered.sort_unstable();
        assert_eq!(delivered, vec![1, 2]);
        assert!(report.failed.is_empty());
        assert_eq!(
            messenger.events_for(1).await,
            vec![ProviderEvent::ChainChanged {
                chain_id: "0x89".into()
            }]
        );
        assert!(messenger.events_for(3).await.is_empty());
        assert!(store.list_all().await.iter().all(|s| s.chain_id == 137));
    }

    #[tokio::test]
    async fn failing_tab_does_not_block_others() {
        let messenger = Arc::new(RecordingMessenger::new());
        messenger.open_tab(1, "https://a.example/").await;
        messenger.open_tab(2, "https://b.example/").await;
        messenger.fail_tab(1).await;
        let (broadcaster, store) = setup(Arc::clone(&messenger)).await;

        let report = broadcaster.broadcast_chain_changed(10).await.unwrap();

        assert_eq!(report.delivered, vec![2]);
        assert_eq!(report.failed, vec![1]);
        // Store update is independent of delivery.
        assert_eq!(store.get("https://a.example").await.unwrap().chain_id, 10);
    }

    #[tokio::test]
    async fn account_change_updates_store_and_pushes() {
        let messenger = Arc::new(RecordingMessenger::new());
        messenger.open_tab(4, "https://b.example/page").await;
        let (broadcaster, store) = setup(Arc::clone(&messenger)).await;

        broadcaster.broadcast_account_changed("0xbbb").await.unwrap();

        assert_eq!(store.get("https://b.example").await.unwrap().account, "0xbbb");
        assert_eq!(
            messenger.events_for(4).await,
            vec![ProviderEvent::AccountsChanged {
                accounts: vec!["0xbbb".into()]
            }]
        );
    }

    #[tokio::test]
    async fn disconnect_targets_only_that_origin() {
        let messenger = Arc::new(RecordingMessenger::new());
        messenger.open_tab(1, "https://a.example/").await;
        messenger.open_tab(2, "https://b.example/").await;
        let (broadcaster, _store) = setup(Arc::clone(&messenger)).await;

        let report = broadcaster.notify_disconnect("https://a.example").await;

        assert_eq!(report.delivered, vec![1]);
        assert!(matches!(
            messenger.events_for(1).await.as_slice(),
            [ProviderEvent::Disconnect { error }] if error.code == 4900
        ));
        assert!(messenger.events_for(2).await.is_empty());
    }

    #[tokio::test]
    async fn no_sites_means_no_delivery() {
        let messenger = Arc::new(RecordingMessenger::new());
        messenger.open_tab(1, "https://a.example/").await;
        let store = Arc::new(
            PermissionStore::load(Arc::new(MemoryStore::new()))
                .await
                .unwrap(),
        );
        let broadcaster = NotificationBroadcaster::new(
            store,
            Arc::clone(&messenger) as Arc<dyn TabMessenger>,
            Duration::from_secs(2),
        );

        assert!(broadcaster.broadcast_chain_changed(137).await.unwrap().is_empty());
        assert!(messenger.events_for(1).await.is_empty());
    }
}
