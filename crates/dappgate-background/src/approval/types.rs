//! Approval broker types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use dappgate_core::protocol::RpcError;

use crate::TabId;

/// UI-visible view of an outstanding approval flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConnectionRequest {
    pub request_id: String,
    pub origin: String,
    pub tab_id: TabId,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds after which the flow counts as rejected.
    pub deadline: i64,
}

/// Terminal failure of an approval flow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalError {
    #[error("User rejected the request")]
    Rejected,

    #[error("Approval request timed out")]
    TimedOut,

    #[error("Approval surface unavailable: {0}")]
    Ui(String),

    #[error("Failed to record approval: {0}")]
    Store(String),

    #[error("Approval flow dropped")]
    Dropped,
}

impl From<ApprovalError> for RpcError {
    fn from(e: ApprovalError) -> Self {
        match e {
            ApprovalError::Rejected => Self::user_rejected("User rejected the request."),
            ApprovalError::TimedOut => Self::user_rejected("User did not respond in time.")
                .with_data(json!({ "reason": "timeout" })),
            other => Self::internal(other.to_string()),
        }
    }
}

/// Failure to present the approval surface.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct UiError(pub String);

/// External host of the approval surface (popup window, notification...).
#[async_trait]
pub trait ApprovalUi: Send + Sync {
    /// Make `request` visible and bring the surface to the front.
    async fn present(&self, request: &PendingConnectionRequest) -> Result<(), UiError>;

    /// The flow for `request_id` is over; stop rendering it.
    async fn dismiss(&self, request_id: &str);
}
