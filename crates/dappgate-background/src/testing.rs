//! In-process fakes for the approval surface and the tab transport.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use dappgate_core::protocol::{Envelope, ProviderEvent};

use crate::TabId;
use crate::approval::{ApprovalUi, PendingConnectionRequest, UiError};
use crate::broadcast::{DeliveryError, TabInfo, TabMessenger};

/// Approval surface that records what it was asked to show.
pub struct RecordingUi {
    tx: mpsc::UnboundedSender<PendingConnectionRequest>,
    rx: Mutex<mpsc::UnboundedReceiver<PendingConnectionRequest>>,
    presented: AtomicUsize,
    dismissed: StdMutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingUi {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            presented: AtomicUsize::new(0),
            dismissed: StdMutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// A surface whose `present` always fails.
    pub fn failing() -> Self {
        let ui = Self::new();
        ui.fail.store(true, Ordering::SeqCst);
        ui
    }

    /// Wait for the next presented request.
    pub async fn next_request(&self) -> Option<PendingConnectionRequest> {
        self.rx.lock().await.recv().await
    }

    pub fn presented_count(&self) -> usize {
        self.presented.load(Ordering::SeqCst)
    }

    /// Request ids dismissed so far, in order.
    pub fn dismissed(&self) -> Vec<String> {
        self.dismissed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for RecordingUi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalUi for RecordingUi {
    async fn present(&self, request: &PendingConnectionRequest) -> Result<(), UiError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(UiError("approval window unavailable".into()));
        }
        self.presented.fetch_add(1, Ordering::SeqCst);
        self.tx
            .send(request.clone())
            .map_err(|e| UiError(e.to_string()))
    }

    async fn dismiss(&self, request_id: &str) {
        self.dismissed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request_id.to_string());
    }
}

/// Tab transport that records deliveries per tab.
#[derive(Default)]
pub struct RecordingMessenger {
    tabs: Mutex<BTreeMap<TabId, String>>,
    failing: Mutex<BTreeSet<TabId>>,
    sent: Mutex<Vec<(TabId, Envelope)>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open_tab(&self, tab_id: TabId, url: &str) {
        self.tabs.lock().await.insert(tab_id, url.to_string());
    }

    pub async fn close_tab(&self, tab_id: TabId) {
        self.tabs.lock().await.remove(&tab_id);
    }

    /// Make every delivery to `tab_id` fail.
    pub async fn fail_tab(&self, tab_id: TabId) {
        self.failing.lock().await.insert(tab_id);
    }

    /// Envelopes delivered to `tab_id`, in order.
    pub async fn messages_for(&self, tab_id: TabId) -> Vec<Envelope> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(id, _)| *id == tab_id)
            .map(|(_, envelope)| envelope.clone())
            .collect()
    }

    /// Provider events delivered to `tab_id`, in order.
    pub async fn events_for(&self, tab_id: TabId) -> Vec<ProviderEvent> {
        self.messages_for(tab_id)
            .await
            .iter()
            .filter_map(ProviderEvent::from_envelope)
            .collect()
    }
}

#[async_trait]
impl TabMessenger for RecordingMessenger {
    async fn tabs(&self) -> Result<Vec<TabInfo>, DeliveryError> {
        Ok(self
            .tabs
            .lock()
            .await
            .iter()
            .map(|(id, url)| TabInfo {
                id: *id,
                url: url.clone(),
            })
            .collect())
    }

    async fn send(&self, tab_id: TabId, envelope: &Envelope) -> Result<(), DeliveryError> {
        if self.failing.lock().await.contains(&tab_id) {
            return Err(DeliveryError::TabGone(tab_id));
        }
        self.sent.lock().await.push((tab_id, envelope.clone()));
        Ok(())
    }
}
