//! Approval broker.
//!
//! Flow:
//! 1. Dispatcher calls `request_approval(origin, tab_id)`
//! 2. Broker records a pending request, arms the timeout, presents the UI
//! 3. The UI host calls `approve()` or `reject()` with the request id,
//!    or the timeout fires first
//! 4. Whichever terminal event claims the record first resolves every caller
//!    waiting on it; later events find nothing and are ignored
//!
//! Only one flow per origin is open at a time. A second request from the
//! same origin joins the open flow and receives the same outcome, even if
//! it arrives while that outcome is being recorded. Once the flow is gone,
//! a request for an origin that is already connected resolves from the
//! permission store without prompting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use dappgate_core::config::ApprovalSettings;
use dappgate_core::db::unix_timestamp;

use super::types::{ApprovalError, ApprovalUi, PendingConnectionRequest};
use crate::TabId;
use crate::permission::{ConnectedSite, PermissionStore};

type Outcome = Result<Vec<String>, ApprovalError>;

/// Configuration for the approval broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// How long a request may stay unanswered.
    pub timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}

impl From<&ApprovalSettings> for BrokerConfig {
    fn from(settings: &ApprovalSettings) -> Self {
        Self {
            timeout: settings.timeout(),
        }
    }
}

struct PendingEntry {
    request: PendingConnectionRequest,
    waiters: Vec<oneshot::Sender<Outcome>>,
    timer: Option<JoinHandle<()>>,
    /// Set once a terminal event has claimed the entry. The entry stays
    /// joinable until its outcome is delivered.
    resolving: bool,
}

#[derive(Default)]
struct BrokerState {
    requests: HashMap<String, PendingEntry>,
    /// origin → request id of its open flow.
    by_origin: HashMap<String, String>,
}

struct Shared {
    state: Mutex<BrokerState>,
    ui: Arc<dyn ApprovalUi>,
}

impl Shared {
    /// Mark `request_id` as resolving. Only the first caller gets the request.
    async fn claim(&self, request_id: &str, abort_timer: bool) -> Option<PendingConnectionRequest> {
        let mut state = self.state.lock().await;
        let entry = state.requests.get_mut(request_id)?;
        if entry.resolving {
            return None;
        }
        entry.resolving = true;
        let timer = entry.timer.take();
        let request = entry.request.clone();
        drop(state);

        if abort_timer && let Some(timer) = timer {
            timer.abort();
        }
        Some(request)
    }

    /// Remove the claimed entry and deliver `outcome` to every waiter,
    /// including callers that joined while the outcome was being decided.
    async fn complete(&self, request: &PendingConnectionRequest, outcome: &Outcome) {
        let waiters = {
            let mut state = self.state.lock().await;
            if state
                .by_origin
                .get(&request.origin)
                .is_some_and(|id| *id == request.request_id)
            {
                state.by_origin.remove(&request.origin);
            }
            state
                .requests
                .remove(&request.request_id)
                .map(|entry| entry.waiters)
                .unwrap_or_default()
        };
        for waiter in waiters {
            // Receiver gone means the caller stopped waiting; nothing to do.
            let _ = waiter.send(outcome.clone());
        }
        self.ui.dismiss(&request.request_id).await;
    }

    async fn expire(self: Arc<Self>, request_id: String, timeout: Duration) {
        tokio::time::sleep(timeout).await;
        if let Some(request) = self.claim(&request_id, false).await {
            warn!(
                request_id = %request_id,
                origin = %request.origin,
                "Connection request timed out"
            );
            self.complete(&request, &Err(ApprovalError::TimedOut)).await;
        }
    }
}

/// Broker between pending `eth_requestAccounts` calls and the approval UI.
pub struct ApprovalBroker {
    shared: Arc<Shared>,
    store: Arc<PermissionStore>,
    config: BrokerConfig,
}

impl ApprovalBroker {
    /// Create a new broker.
    pub fn new(store: Arc<PermissionStore>, ui: Arc<dyn ApprovalUi>, config: BrokerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState::default()),
                ui,
            }),
            store,
            config,
        }
    }

    /// Ask the user to connect `origin`; resolves with the approved account.
    pub async fn request_approval(&self, origin: &str, tab_id: TabId) -> Outcome {
        let (tx, rx) = oneshot::channel();

        let fresh = {
            let mut state = self.shared.state.lock().await;
            if let Some(id) = state.by_origin.get(origin).cloned()
                && let Some(entry) = state.requests.get_mut(&id)
            {
                entry.waiters.push(tx);
                info!(origin, request_id = %id, "Joining open connection request");
                None
            } else if let Some(site) = self.store.get(origin).await {
                // A flow for this origin finished between the caller's
                // permission check and now.
                debug!(origin, "Origin already connected");
                return Ok(vec![site.account]);
            } else {
                let request = self.new_request(origin, tab_id);
                let timer = tokio::spawn(
                    Arc::clone(&self.shared).expire(request.request_id.clone(), self.config.timeout),
                );
                state
                    .by_origin
                    .insert(origin.to_string(), request.request_id.clone());
                state.requests.insert(
                    request.request_id.clone(),
                    PendingEntry {
                        request: request.clone(),
                        waiters: vec![tx],
                        timer: Some(timer),
                        resolving: false,
                    },
                );
                Some(request)
            }
        };

        if let Some(request) = fresh {
            info!(
                origin,
                tab_id,
                request_id = %request.request_id,
                "Connection approval requested"
            );
            if let Err(e) = self.shared.ui.present(&request).await {
                warn!(request_id = %request.request_id, error = %e, "Failed to present approval");
                if self.shared.claim(&request.request_id, true).await.is_some() {
                    self.shared
                        .complete(&request, &Err(ApprovalError::Ui(e.0)))
                        .await;
                }
            }
        }

        rx.await.unwrap_or(Err(ApprovalError::Dropped))
    }

    /// Resolve `request_id` as approved with `account` on `chain_id`.
    ///
    /// Returns `false` if the request was already resolved (or never existed),
    /// in which case the permission store is not touched.
    pub async fn approve(&self, request_id: &str, account: &str, chain_id: u64) -> bool {
        if account.trim().is_empty() {
            warn!(request_id, "Ignoring approval without an account");
            return false;
        }
        let Some(request) = self.shared.claim(request_id, true).await else {
            debug!(request_id, "Approval for resolved or unknown request ignored");
            return false;
        };

        let origin = request.origin.clone();
        let mut site = ConnectedSite::new(&origin, account, chain_id);
        if let Some(existing) = self.store.get(&origin).await {
            site.permissions.extend(existing.permissions);
        }

        let outcome = match self.store.upsert(site).await {
            Ok(site) => {
                info!(origin = %origin, account = %site.account, chain_id, "Connection approved");
                Ok(vec![site.account])
            }
            Err(e) => {
                warn!(origin = %origin, error = %e, "Failed to record approval");
                Err(ApprovalError::Store(e.to_string()))
            }
        };
        self.shared.complete(&request, &outcome).await;
        true
    }

    /// Resolve `request_id` as rejected. Returns `false` if already resolved.
    pub async fn reject(&self, request_id: &str) -> bool {
        let Some(request) = self.shared.claim(request_id, true).await else {
            debug!(request_id, "Rejection for resolved or unknown request ignored");
            return false;
        };
        info!(request_id, origin = %request.origin, "Connection rejected");
        self.shared
            .complete(&request, &Err(ApprovalError::Rejected))
            .await;
        true
    }

    /// Outstanding requests, oldest first.
    pub async fn pending(&self) -> Vec<PendingConnectionRequest> {
        let state = self.shared.state.lock().await;
        let mut list: Vec<_> = state
            .requests
            .values()
            .filter(|e| !e.resolving)
            .map(|e| e.request.clone())
            .collect();
        drop(state);
        list.sort_by_key(|r| r.created_at);
        list
    }

    /// Get an outstanding request by id.
    pub async fn get(&self, request_id: &str) -> Option<PendingConnectionRequest> {
        self.shared
            .state
            .lock()
            .await
            .requests
            .get(request_id)
            .filter(|e| !e.resolving)
            .map(|e| e.request.clone())
    }

    pub async fn pending_count(&self) -> usize {
        let state = self.shared.state.lock().await;
        state.requests.values().filter(|e| !e.resolving).count()
    }

    pub async fn is_pending(&self, request_id: &str) -> bool {
        self.get(request_id).await.is_some()
    }

    /// Get the configuration.
    pub const fn config(&self) -> &BrokerConfig {
        &self.config
    }

    fn new_request(&self, origin: &str, tab_id: TabId) -> PendingConnectionRequest {
        let now = unix_timestamp();
        let window = i64::try_from(self.config.timeout.as_secs()).unwrap_or(i64::MAX);
        PendingConnectionRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            origin: origin.to_string(),
            tab_id,
            created_at: now,
            deadline: now.saturating_add(window),
        }
    }
}
