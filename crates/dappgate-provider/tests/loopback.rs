//! Provider wired to a real background dispatcher through in-process channels.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};

use dappgate_background::TabId;
use dappgate_background::approval::{ApprovalBroker, BrokerConfig};
use dappgate_background::broadcast::{DeliveryError, NotificationBroadcaster, TabInfo, TabMessenger};
use dappgate_background::network::NetworkManager;
use dappgate_background::permission::PermissionStore;
use dappgate_background::rpc::{CallContext, RpcDispatcher};
use dappgate_background::signer::PlaceholderSigner;
use dappgate_background::storage::{KeyValueStore, MemoryStore};
use dappgate_background::testing::RecordingUi;
use dappgate_core::protocol::{Envelope, ProviderEvent, RpcRequest, message_types};
use dappgate_provider::{Provider, ProviderConfig, ProviderState, Transport, TransportError};

const ORIGIN: &str = "https://dapp.example";
const TAB: TabId = 9;

struct ChannelTransport {
    tx: mpsc::UnboundedSender<Envelope>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.tx
            .send(envelope)
            .map_err(|e| TransportError(e.to_string()))
    }
}

/// Delivers background pushes to the single page under test.
struct PageMessenger {
    tx: mpsc::UnboundedSender<Envelope>,
}

#[async_trait]
impl TabMessenger for PageMessenger {
    async fn tabs(&self) -> Result<Vec<TabInfo>, DeliveryError> {
        Ok(vec![TabInfo {
            id: TAB,
            url: format!("{ORIGIN}/swap"),
        }])
    }

    async fn send(&self, tab_id: TabId, envelope: &Envelope) -> Result<(), DeliveryError> {
        self.tx
            .send(envelope.clone())
            .map_err(|_| DeliveryError::TabGone(tab_id))
    }
}

struct World {
    provider: Arc<Provider>,
    broker: Arc<ApprovalBroker>,
    ui: Arc<RecordingUi>,
}

async fn world() -> World {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let store = Arc::new(PermissionStore::load(Arc::clone(&kv)).await.unwrap());
    let networks = Arc::new(NetworkManager::load(kv).await.unwrap());
    let ui = Arc::new(RecordingUi::new());

    let (to_page, mut page_inbox) = mpsc::unbounded_channel::<Envelope>();
    let (to_background, mut background_inbox) = mpsc::unbounded_channel::<Envelope>();

    let broker = Arc::new(ApprovalBroker::new(
        Arc::clone(&store),
        ui.clone(),
        BrokerConfig::default(),
    ));
    let broadcaster = Arc::new(NotificationBroadcaster::new(
        Arc::clone(&store),
        Arc::new(PageMessenger {
            tx: to_page.clone(),
        }),
        Duration::from_secs(2),
    ));
    let dispatcher = Arc::new(RpcDispatcher::new(
        Arc::clone(&store),
        Arc::clone(&broker),
        networks,
        broadcaster,
        Arc::new(PlaceholderSigner),
    ));

    let provider = Arc::new(Provider::new(
        Arc::new(ChannelTransport { tx: to_background }),
        ProviderConfig::default(),
    ));

    // Background side: execute each request on its own task.
    tokio::spawn(async move {
        while let Some(envelope) = background_inbox.recv().await {
            assert_eq!(envelope.msg_type, message_types::REQUEST);
            let dispatcher = Arc::clone(&dispatcher);
            let to_page = to_page.clone();
            tokio::spawn(async move {
                let id = envelope.id.clone().unwrap();
                let request: RpcRequest = envelope.data_as().unwrap();
                let ctx = CallContext::new(ORIGIN, TAB);
                let result = dispatcher
                    .execute(&request.method, request.params, &ctx)
                    .await;
                let _ = to_page.send(Envelope::response(id, result));
            });
        }
    });

    // Page side: feed replies and pushes to the provider in arrival order.
    let page = Arc::clone(&provider);
    tokio::spawn(async move {
        while let Some(envelope) = page_inbox.recv().await {
            page.handle_message(envelope).await;
        }
    });

    World {
        provider,
        broker,
        ui,
    }
}

async fn connect(w: &World) -> broadcast::Receiver<ProviderEvent> {
    let events = w.provider.subscribe();
    let provider = Arc::clone(&w.provider);
    let call =
        tokio::spawn(async move { provider.request("eth_requestAccounts", json!([])).await });

    let pending = w.ui.next_request().await.unwrap();
    assert_eq!(pending.origin, ORIGIN);
    assert_eq!(pending.tab_id, TAB);
    assert!(w.broker.approve(&pending.request_id, "0xabc", 1).await);

    assert_eq!(call.await.unwrap().unwrap(), json!(["0xabc"]));
    events
}

#[tokio::test]
async fn disconnected_provider_never_reaches_background() {
    let w = world().await;
    let err = w
        .provider
        .request("eth_accounts", json!([]))
        .await
        .unwrap_err();
    assert_eq!(err.code, 4900);
    assert_eq!(w.ui.presented_count(), 0);
}

#[tokio::test]
async fn connect_flow_authorizes_provider() {
    let w = world().await;
    let mut events = connect(&w).await;

    assert_eq!(
        events.recv().await.unwrap(),
        ProviderEvent::Connect {
            chain_id: "0x1".into()
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        ProviderEvent::AccountsChanged {
            accounts: vec!["0xabc".into()]
        }
    );
    let state = w.provider.state().await;
    assert_eq!(state.state, ProviderState::Authorized);
    assert_eq!(state.chain_id.as_deref(), Some("0x1"));

    let accounts = w.provider.request("eth_accounts", json!([])).await.unwrap();
    assert_eq!(accounts, json!(["0xabc"]));
}

#[tokio::test]
async fn rejected_connect_leaves_provider_disconnected() {
    let w = world().await;
    let provider = Arc::clone(&w.provider);
    let call =
        tokio::spawn(async move { provider.request("eth_requestAccounts", json!([])).await });

    let pending = w.ui.next_request().await.unwrap();
    assert!(w.broker.reject(&pending.request_id).await);

    assert_eq!(call.await.unwrap().unwrap_err().code, 4001);
    assert!(!w.provider.is_authorized().await);
}

#[tokio::test]
async fn chain_switch_is_pushed_before_the_reply() {
    let w = world().await;
    let mut events = connect(&w).await;
    events.recv().await.unwrap();
    events.recv().await.unwrap();

    let result = w
        .provider
        .request("wallet_switchEthereumChain", json!([{"chainId": "0x89"}]))
        .await
        .unwrap();
    assert_eq!(result, Value::Null);

    // The push precedes the reply on the page channel.
    assert_eq!(w.provider.chain_id().await.as_deref(), Some("0x89"));
    assert_eq!(
        events.recv().await.unwrap(),
        ProviderEvent::ChainChanged {
            chain_id: "0x89".into()
        }
    );
}

#[tokio::test]
async fn revoking_permissions_disconnects_provider() {
    let w = world().await;
    let mut events = connect(&w).await;
    events.recv().await.unwrap();
    events.recv().await.unwrap();

    w.provider
        .request("wallet_revokePermissions", json!([{"eth_accounts": {}}]))
        .await
        .unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        ProviderEvent::Disconnect { .. }
    ));
    assert_eq!(
        events.recv().await.unwrap(),
        ProviderEvent::AccountsChanged { accounts: vec![] }
    );
    assert!(!w.provider.is_authorized().await);
}

#[tokio::test]
async fn signing_uses_the_connected_account() {
    let w = world().await;
    connect(&w).await;

    let signature = w
        .provider
        .request("personal_sign", json!(["0x68656c6c6f", "0xabc"]))
        .await
        .unwrap();
    assert_eq!(signature.as_str().map(str::len), Some(132));

    let err = w
        .provider
        .request("eth_sendTransaction", json!([{"to": "0xdef"}]))
        .await
        .unwrap_err();
    assert_eq!(err.code, 4200);
}
