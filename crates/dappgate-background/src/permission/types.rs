//! Permission store types.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use dappgate_core::db::{DatabaseError, unix_timestamp};
use dappgate_core::protocol::{CONNECTED_PERMISSION, RpcError};

/// Authorization record for one origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedSite {
    /// Scheme + host + port; unique key.
    pub origin: String,
    /// Account exposed to the origin.
    pub account: String,
    /// Chain the origin currently observes.
    pub chain_id: u64,
    /// Capability tags, e.g. `"connected"`.
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// Unix seconds of the first approval; never changes afterwards.
    #[serde(default)]
    pub connected_at: i64,
    /// Unix seconds of the last authorized use.
    #[serde(default)]
    pub last_used: i64,
}

impl ConnectedSite {
    /// A freshly approved site holding the `connected` permission.
    pub fn new(origin: impl Into<String>, account: impl Into<String>, chain_id: u64) -> Self {
        let now = unix_timestamp();
        Self {
            origin: origin.into(),
            account: account.into(),
            chain_id,
            permissions: BTreeSet::from([CONNECTED_PERMISSION.to_string()]),
            connected_at: now,
            last_used: now,
        }
    }

    pub fn has_permission(&self, tag: &str) -> bool {
        self.permissions.contains(tag)
    }
}

/// Permission store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Corrupt stored state under {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<StoreError> for RpcError {
    fn from(e: StoreError) -> Self {
        Self::internal(e.to_string())
    }
}
