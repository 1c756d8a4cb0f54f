//! Broadcaster types.

use async_trait::async_trait;

use dappgate_core::protocol::Envelope;

use crate::TabId;

/// An open browser tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub url: String,
}

/// Failure to deliver one message to one tab.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    #[error("Tab {0} is gone")]
    TabGone(TabId),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Outbound path from the background to page contexts.
#[async_trait]
pub trait TabMessenger: Send + Sync {
    /// Currently open tabs.
    async fn tabs(&self) -> Result<Vec<TabInfo>, DeliveryError>;

    /// Deliver `envelope` to the page context of `tab_id`.
    async fn send(&self, tab_id: TabId, envelope: &Envelope) -> Result<(), DeliveryError>;
}

/// Per-tab outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<TabId>,
    pub failed: Vec<TabId>,
}

impl BroadcastReport {
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty() && self.failed.is_empty()
    }
}
