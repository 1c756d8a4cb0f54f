//! Network manager persisted under `selectedNetwork` and `customNetworks`.
//!
//! Same single-writer discipline as the permission store: state changes are
//! written to storage under the lock before they become visible.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use dappgate_core::db::DatabaseError;
use dappgate_core::network::{DEFAULT_CHAIN_ID, find_builtin};
use dappgate_core::protocol::RpcError;
use dappgate_core::Network;

use crate::storage::{KeyValueStore, keys};

/// Result of a chain switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// Target was already selected; nothing was written.
    Unchanged(Network),
    /// Selection changed and was persisted.
    Switched { previous: u64, network: Network },
}

/// Result of adding a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Chain id is built-in or already added; nothing was written.
    AlreadyPresent,
    Added(Network),
}

/// Network manager errors.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Unrecognized chain ID {0:#x}")]
    UnknownChain(u64),

    #[error("Invalid network: {0}")]
    Invalid(String),

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Corrupt stored state under {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<NetworkError> for RpcError {
    fn from(e: NetworkError) -> Self {
        match e {
            NetworkError::UnknownChain(id) => Self::unrecognized_chain(id),
            NetworkError::Invalid(msg) => Self::invalid_params(msg),
            other => Self::internal(other.to_string()),
        }
    }
}

struct NetworkState {
    selected: Network,
    custom: Vec<Network>,
}

/// Owner of the selected network and the custom network list.
pub struct NetworkManager {
    kv: Arc<dyn KeyValueStore>,
    state: Mutex<NetworkState>,
}

impl NetworkManager {
    /// Load persisted network state, defaulting to Ethereum Mainnet.
    pub async fn load(kv: Arc<dyn KeyValueStore>) -> Result<Self, NetworkError> {
        let custom: Vec<Network> = match kv.get(keys::CUSTOM_NETWORKS).await? {
            Some(value) => serde_json::from_value(value).map_err(|e| NetworkError::Corrupt {
                key: keys::CUSTOM_NETWORKS.to_string(),
                reason: e.to_string(),
            })?,
            None => Vec::new(),
        };

        let selected = match kv.get(keys::SELECTED_NETWORK).await? {
            Some(value) => serde_json::from_value(value).map_err(|e| NetworkError::Corrupt {
                key: keys::SELECTED_NETWORK.to_string(),
                reason: e.to_string(),
            })?,
            None => find_builtin(DEFAULT_CHAIN_ID)
                .ok_or(NetworkError::UnknownChain(DEFAULT_CHAIN_ID))?,
        };

        info!(
            chain_id = selected.chain_id,
            custom = custom.len(),
            "Loaded network state"
        );

        Ok(Self {
            kv,
            state: Mutex::new(NetworkState { selected, custom }),
        })
    }

    /// Currently selected network.
    pub async fn selected(&self) -> Network {
        self.state.lock().await.selected.clone()
    }

    /// Select `chain_id`, persisting the change unless it is already current.
    #[allow(clippy::significant_drop_tightening)]
    pub async fn select(&self, chain_id: u64) -> Result<SwitchOutcome, NetworkError> {
        let mut state = self.state.lock().await;

        if state.selected.chain_id == chain_id {
            debug!(chain_id, "Network already selected");
            return Ok(SwitchOutcome::Unchanged(state.selected.clone()));
        }

        let network = find_builtin(chain_id)
            .or_else(|| state.custom.iter().find(|n| n.chain_id == chain_id).cloned())
            .ok_or(NetworkError::UnknownChain(chain_id))?;

        let value = serde_json::to_value(&network).map_err(|e| NetworkError::Corrupt {
            key: keys::SELECTED_NETWORK.to_string(),
            reason: e.to_string(),
        })?;
        self.kv.set(keys::SELECTED_NETWORK, &value).await?;

        let previous = state.selected.chain_id;
        state.selected = network.clone();
        info!(previous, chain_id, name = %network.chain_name, "Network switched");

        Ok(SwitchOutcome::Switched { previous, network })
    }

    /// Add a custom network unless its chain id is already known.
    #[allow(clippy::significant_drop_tightening)]
    pub async fn add_custom(&self, mut network: Network) -> Result<AddOutcome, NetworkError> {
        validate(&network)?;

        let mut state = self.state.lock().await;
        if find_builtin(network.chain_id).is_some()
            || state.custom.iter().any(|n| n.chain_id == network.chain_id)
        {
            debug!(chain_id = network.chain_id, "Network already present");
            return Ok(AddOutcome::AlreadyPresent);
        }

        network.custom = true;
        let mut working = state.custom.clone();
        working.push(network.clone());

        let value = serde_json::to_value(&working).map_err(|e| NetworkError::Corrupt {
            key: keys::CUSTOM_NETWORKS.to_string(),
            reason: e.to_string(),
        })?;
        self.kv.set(keys::CUSTOM_NETWORKS, &value).await?;
        state.custom = working;

        info!(chain_id = network.chain_id, name = %network.chain_name, "Custom network added");
        Ok(AddOutcome::Added(network))
    }
}

fn validate(network: &Network) -> Result<(), NetworkError> {
    if network.chain_id == 0 {
        return Err(NetworkError::Invalid("chainId must be non-zero".into()));
    }
    if network.chain_name.trim().is_empty() {
        return Err(NetworkError::Invalid("chainName is required".into()));
    }
    if network.rpc_urls.is_empty() {
        return Err(NetworkError::Invalid("rpcUrls must not be empty".into()));
    }
    for raw in &network.rpc_urls {
        let url = Url::parse(raw)
            .map_err(|e| NetworkError::Invalid(format!("rpc url {raw}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(NetworkError::Invalid(format!("unsupported rpc url: {raw}")));
        }
    }
    Ok(())
}
