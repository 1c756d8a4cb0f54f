//! Routes host commands to the background components.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use dappgate_core::origin::origin_of;
use dappgate_core::protocol::{Envelope, RpcError, parse_line};

use super::frames::{HostCommand, OutboundFrame};
use crate::TabId;
use crate::approval::{ApprovalBroker, ApprovalUi, PendingConnectionRequest, UiError};
use crate::broadcast::{DeliveryError, NotificationBroadcaster, TabInfo, TabMessenger};
use crate::network::NetworkManager;
use crate::permission::PermissionStore;
use crate::rpc::{CallContext, RpcDispatcher, apply_chain_switch};

/// Outbound half of the stdio transport, plus the open-tab registry.
///
/// Serves as both the approval surface and the tab messenger.
#[derive(Clone)]
pub struct HostChannel {
    tx: mpsc::Sender<OutboundFrame>,
    tabs: Arc<RwLock<BTreeMap<TabId, String>>>,
}

impl HostChannel {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let channel = Self {
            tx,
            tabs: Arc::new(RwLock::new(BTreeMap::new())),
        };
        (channel, rx)
    }

    pub async fn tab_updated(&self, tab_id: TabId, url: String) {
        self.tabs.write().await.insert(tab_id, url);
    }

    pub async fn tab_removed(&self, tab_id: TabId) -> bool {
        self.tabs.write().await.remove(&tab_id).is_some()
    }

    /// Queue a frame for the writer task.
    pub async fn send_frame(&self, frame: OutboundFrame) -> Result<(), DeliveryError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| DeliveryError::Transport("output closed".into()))
    }
}

#[async_trait]
impl ApprovalUi for HostChannel {
    async fn present(&self, request: &PendingConnectionRequest) -> Result<(), UiError> {
        self.send_frame(OutboundFrame::show_approval(request))
            .await
            .map_err(|e| UiError(e.to_string()))
    }

    async fn dismiss(&self, request_id: &str) {
        if let Err(e) = self
            .send_frame(OutboundFrame::dismiss_approval(request_id))
            .await
        {
            debug!(request_id, error = %e, "Could not dismiss approval");
        }
    }
}

#[async_trait]
impl TabMessenger for HostChannel {
    async fn tabs(&self) -> Result<Vec<TabInfo>, DeliveryError> {
        Ok(self
            .tabs
            .read()
            .await
            .iter()
            .map(|(id, url)| TabInfo {
                id: *id,
                url: url.clone(),
            })
            .collect())
    }

    async fn send(&self, tab_id: TabId, envelope: &Envelope) -> Result<(), DeliveryError> {
        if !self.tabs.read().await.contains_key(&tab_id) {
            return Err(DeliveryError::TabGone(tab_id));
        }
        self.send_frame(OutboundFrame::Tab {
            tab_id,
            message: envelope.clone(),
        })
        .await
    }
}

/// Everything the router needs, built once at startup.
pub struct HostRouter {
    channel: HostChannel,
    dispatcher: Arc<RpcDispatcher>,
    broker: Arc<ApprovalBroker>,
    store: Arc<PermissionStore>,
    networks: Arc<NetworkManager>,
    broadcaster: Arc<NotificationBroadcaster>,
}

impl HostRouter {
    pub const fn new(
        channel: HostChannel,
        dispatcher: Arc<RpcDispatcher>,
        broker: Arc<ApprovalBroker>,
        store: Arc<PermissionStore>,
        networks: Arc<NetworkManager>,
        broadcaster: Arc<NotificationBroadcaster>,
    ) -> Self {
        Self {
            channel,
            dispatcher,
            broker,
            store,
            networks,
            broadcaster,
        }
    }

    /// Handle one inbound line. Malformed lines are logged and skipped.
    pub async fn handle_line(self: &Arc<Self>, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let command = match parse_line(line).map_err(Into::into).and_then(|envelope| {
            HostCommand::from_envelope(&envelope)
        }) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "Skipping malformed frame");
                return;
            }
        };
        self.handle(command).await;
    }

    /// Handle a decoded command.
    ///
    /// Page requests run on their own task so a pending approval never
    /// blocks the command loop (the approve frame arrives on the same loop).
    pub async fn handle(self: &Arc<Self>, command: HostCommand) {
        match command {
            HostCommand::Request {
                id,
                origin,
                tab_id,
                method,
                params,
            } => {
                let router = Arc::clone(self);
                tokio::spawn(async move {
                    router.serve_request(id, &origin, tab_id, &method, params).await;
                });
            }
            HostCommand::Approve {
                request_id,
                account,
                chain_id,
            } => {
                if !self.broker.approve(&request_id, &account, chain_id).await {
                    debug!(request_id = %request_id, "Approve had no effect");
                }
            }
            HostCommand::Reject { request_id } => {
                if !self.broker.reject(&request_id).await {
                    debug!(request_id = %request_id, "Reject had no effect");
                }
            }
            HostCommand::TabUpdated { tab_id, url } => {
                debug!(tab_id, url = %url, "Tab updated");
                self.channel.tab_updated(tab_id, url).await;
            }
            HostCommand::TabRemoved { tab_id } => {
                if self.channel.tab_removed(tab_id).await {
                    debug!(tab_id, "Tab removed");
                }
            }
            HostCommand::SwitchNetwork { chain_id } => self.switch_network(chain_id).await,
            HostCommand::SwitchAccount { account } => {
                if let Err(e) = self.broadcaster.broadcast_account_changed(&account).await {
                    warn!(error = %e, "Account switch failed");
                }
            }
            HostCommand::DisconnectSite { origin } => self.disconnect_site(&origin).await,
        }
    }

    async fn serve_request(
        &self,
        id: String,
        origin: &str,
        tab_id: TabId,
        method: &str,
        params: serde_json::Value,
    ) {
        let result = match origin_of(origin) {
            Some(origin) => {
                let ctx = CallContext::new(origin, tab_id);
                self.dispatcher.execute(method, params, &ctx).await
            }
            None => Err(RpcError::unauthorized("Request has no valid origin")),
        };

        let frame = OutboundFrame::Tab {
            tab_id,
            message: Envelope::response(id, result),
        };
        if let Err(e) = self.channel.send_frame(frame).await {
            warn!(tab_id, method, error = %e, "Failed to send response");
        }
    }

    async fn disconnect_site(&self, raw: &str) {
        let Some(origin) = origin_of(raw) else {
            warn!(origin = raw, "Disconnect for an invalid origin ignored");
            return;
        };
        match self.store.remove(&origin).await {
            Ok(Some(_)) => {
                self.broadcaster.notify_disconnect(&origin).await;
            }
            Ok(None) => debug!(origin = %origin, "Site was not connected"),
            Err(e) => warn!(origin = %origin, error = %e, "Disconnect failed"),
        }
    }

    async fn switch_network(&self, chain_id: u64) {
        match apply_chain_switch(&self.networks, &self.broadcaster, chain_id).await {
            Ok(report) if report.is_empty() => debug!(chain_id, "No tabs needed a chain update"),
            Ok(report) => info!(
                chain_id,
                delivered = report.delivered.len(),
                "Wallet switched network"
            ),
            Err(e) => warn!(chain_id, error = %e, "Network switch failed"),
        }
    }
}
