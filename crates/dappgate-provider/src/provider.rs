//! Provider client state machine.
//!
//! ```text
//! Disconnected --eth_requestAccounts--> Authorizing --ok--> Authorized
//!      ^                                    |                  |
//!      +------------- error / timeout ------+                  |
//!      +------------------- disconnect push -------------------+
//! ```
//!
//! While `Disconnected`, every method except `eth_requestAccounts` fails
//! immediately with 4900 and never reaches the transport.
//!
//! `is_connected` tracks the transport only; a fresh provider is connected
//! but not authorized.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{Mutex, broadcast, oneshot};
use tracing::{debug, info, warn};

use dappgate_core::config::ProviderSettings;
use dappgate_core::protocol::{
    Envelope, ProviderEvent, ResponsePayload, RpcError, RpcRequest, message_types, methods,
};

use crate::transport::Transport;

type Reply = Result<Value, RpcError>;

const EVENT_CAPACITY: usize = 64;

/// Authorization state of the page session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderState {
    #[default]
    Disconnected,
    /// An account request is outstanding.
    Authorizing,
    Authorized,
}

/// Point-in-time view of the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderClientState {
    pub state: ProviderState,
    pub selected_address: Option<String>,
    /// `0x`-hex.
    pub chain_id: Option<String>,
    /// The background is reachable. Independent of authorization.
    pub is_connected: bool,
    pub is_authorized: bool,
}

/// Call timeouts.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub request_timeout: Duration,
    /// Longer than the background's approval window, so the page observes
    /// the background's own timeout rather than racing it.
    pub account_request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::from(&ProviderSettings::default())
    }
}

impl From<&ProviderSettings> for ProviderConfig {
    fn from(settings: &ProviderSettings) -> Self {
        Self {
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            account_request_timeout: Duration::from_secs(settings.account_request_timeout_secs),
        }
    }
}

#[derive(Debug)]
struct Session {
    state: ProviderState,
    selected_address: Option<String>,
    chain_id: Option<String>,
    transport_available: bool,
}

impl Session {
    fn snapshot(&self) -> ProviderClientState {
        let is_authorized = self.state == ProviderState::Authorized;
        ProviderClientState {
            state: self.state,
            selected_address: self.selected_address.clone(),
            chain_id: self.chain_id.clone(),
            is_connected: self.transport_available,
            is_authorized,
        }
    }
}

/// EIP-1193-shaped provider for one page context.
pub struct Provider {
    transport: Arc<dyn Transport>,
    session: Mutex<Session>,
    /// Correlation id → waiting caller. Each entry is removed exactly once,
    /// by its reply or by its timeout.
    pending: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
    events: broadcast::Sender<ProviderEvent>,
    config: ProviderConfig,
}

impl Provider {
    pub fn new(transport: Arc<dyn Transport>, config: ProviderConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            session: Mutex::new(Session {
                state: ProviderState::Disconnected,
                selected_address: None,
                chain_id: None,
                transport_available: true,
            }),
            pending: Mutex::new(HashMap::new()),
            events,
            config,
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> ProviderClientState {
        self.session.lock().await.snapshot()
    }

    pub async fn selected_address(&self) -> Option<String> {
        self.session.lock().await.selected_address.clone()
    }

    pub async fn chain_id(&self) -> Option<String> {
        self.session.lock().await.chain_id.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.snapshot().is_connected
    }

    pub async fn is_authorized(&self) -> bool {
        self.session.lock().await.state == ProviderState::Authorized
    }

    /// Number of calls awaiting a reply.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Issue an RPC call.
    pub async fn request(&self, method: &str, params: Value) -> Reply {
        if method == methods::REQUEST_ACCOUNTS {
            return self.request_accounts(params).await;
        }

        let state = self.session.lock().await.state;
        if state == ProviderState::Disconnected {
            debug!(method, "Rejecting call while disconnected");
            return Err(RpcError::disconnected(
                "Provider is not connected; call eth_requestAccounts first",
            ));
        }
        self.round_trip(method, params, self.config.request_timeout)
            .await
    }

    /// Feed one message received from the background.
    pub async fn handle_message(&self, envelope: Envelope) {
        if envelope.msg_type == message_types::RESPONSE {
            self.handle_response(envelope).await;
            return;
        }
        match ProviderEvent::from_envelope(&envelope) {
            Some(event) => self.apply_push(event).await,
            None => debug!(msg_type = %envelope.msg_type, "Ignoring unknown message"),
        }
    }

    /// Mark the transport as usable or lost.
    ///
    /// Losing it fails every outstanding call with 4900 and ends the
    /// authorized session.
    pub async fn set_transport_available(&self, available: bool) {
        let mut session = self.session.lock().await;
        if session.transport_available == available {
            return;
        }
        session.transport_available = available;
        if available {
            info!("Transport available");
            return;
        }

        warn!("Transport lost");
        let waiters: Vec<_> = self.pending.lock().await.drain().collect();
        for (_, tx) in waiters {
            let _ = tx.send(Err(RpcError::disconnected("Transport lost")));
        }
        self.end_session(&mut session, RpcError::disconnected("Transport lost"));
    }

    async fn request_accounts(&self, params: Value) -> Reply {
        {
            let mut session = self.session.lock().await;
            if !session.transport_available {
                return Err(RpcError::disconnected("Transport unavailable"));
            }
            if session.state == ProviderState::Disconnected {
                session.state = ProviderState::Authorizing;
            }
        }

        let outcome = self.authorize(params).await;

        let mut session = self.session.lock().await;
        match outcome {
            Ok((accounts, chain_id)) => {
                let newly = session.state != ProviderState::Authorized;
                let changed =
                    session.selected_address.as_deref() != accounts.first().map(String::as_str);
                session.state = ProviderState::Authorized;
                session.selected_address = accounts.first().cloned();
                session.chain_id = Some(chain_id.clone());

                if newly {
                    info!(account = ?session.selected_address, chain_id = %chain_id, "Provider authorized");
                    self.emit(ProviderEvent::Connect { chain_id });
                }
                if newly || changed {
                    self.emit(ProviderEvent::AccountsChanged {
                        accounts: accounts.clone(),
                    });
                }
                drop(session);
                Ok(json!(accounts))
            }
            Err(e) => {
                if session.state == ProviderState::Authorizing {
                    session.state = ProviderState::Disconnected;
                }
                drop(session);
                debug!(code = e.code, "Account request failed");
                Err(e)
            }
        }
    }

    /// Account request followed by the chain lookup.
    async fn authorize(&self, params: Value) -> Result<(Vec<String>, String), RpcError> {
        let value = self
            .round_trip(
                methods::REQUEST_ACCOUNTS,
                params,
                self.config.account_request_timeout,
            )
            .await?;
        let accounts: Vec<String> = serde_json::from_value(value)
            .map_err(|e| RpcError::internal(format!("malformed accounts: {e}")))?;
        if accounts.is_empty() {
            return Err(RpcError::internal("background returned no accounts"));
        }

        let chain = self
            .round_trip(methods::CHAIN_ID, json!([]), self.config.request_timeout)
            .await?;
        let chain_id = chain
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::internal("malformed chain id"))?;
        Ok((accounts, chain_id))
    }

    async fn round_trip(&self, method: &str, params: Value, timeout: Duration) -> Reply {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        let envelope = Envelope::request(id.clone(), &RpcRequest::new(method, params));
        if let Err(e) = self.transport.send(envelope).await {
            self.pending.lock().await.remove(&id);
            warn!(method, error = %e, "Send failed");
            return Err(RpcError::disconnected(e.to_string()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(RpcError::disconnected("Provider disconnected")),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                warn!(method, id = %id, "Request timed out");
                Err(RpcError::disconnected(format!("Request timed out: {method}"))
                    .with_data(json!({ "reason": "timeout" })))
            }
        }
    }

    async fn handle_response(&self, envelope: Envelope) {
        let Some(id) = envelope.id.clone() else {
            warn!("Response without id");
            return;
        };
        let Some(tx) = self.pending.lock().await.remove(&id) else {
            debug!(id = %id, "Reply for unknown or expired request ignored");
            return;
        };
        let reply = envelope
            .data_as::<ResponsePayload>()
            .map_err(|e| RpcError::internal(e.to_string()))
            .and_then(ResponsePayload::into_result);
        // Caller gone means it stopped waiting; nothing to do.
        let _ = tx.send(reply);
    }

    async fn apply_push(&self, event: ProviderEvent) {
        let mut session = self.session.lock().await;
        match event {
            ProviderEvent::ChainChanged { chain_id } => {
                if session.chain_id.as_deref() == Some(chain_id.as_str()) {
                    return;
                }
                session.chain_id = Some(chain_id.clone());
                if session.state == ProviderState::Authorized {
                    debug!(chain_id = %chain_id, "Chain changed");
                    self.emit(ProviderEvent::ChainChanged { chain_id });
                }
            }
            ProviderEvent::AccountsChanged { accounts } => match accounts.first().cloned() {
                None => {
                    if session.state != ProviderState::Disconnected {
                        session.state = ProviderState::Disconnected;
                        session.selected_address = None;
                        self.emit(ProviderEvent::AccountsChanged { accounts });
                    }
                }
                Some(first) if session.state == ProviderState::Authorized => {
                    if session.selected_address.as_deref() != Some(first.as_str()) {
                        session.selected_address = Some(first);
                        self.emit(ProviderEvent::AccountsChanged { accounts });
                    }
                }
                Some(_) => debug!("Ignoring accountsChanged while not authorized"),
            },
            ProviderEvent::Disconnect { error } => self.end_session(&mut session, error),
            ProviderEvent::Connect { chain_id } => {
                session.chain_id = Some(chain_id);
            }
        }
    }

    fn end_session(&self, session: &mut Session, error: RpcError) {
        if session.state == ProviderState::Disconnected && session.selected_address.is_none() {
            return;
        }
        info!(code = error.code, "Provider disconnected");
        session.state = ProviderState::Disconnected;
        session.selected_address = None;
        self.emit(ProviderEvent::Disconnect { error });
        self.emit(ProviderEvent::AccountsChanged {
            accounts: Vec::new(),
        });
    }

    fn emit(&self, event: ProviderEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
