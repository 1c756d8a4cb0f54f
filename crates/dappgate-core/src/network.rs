//! Network descriptors and the built-in network table.

use serde::{Deserialize, Serialize};

/// A chain the wallet can switch to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub block_explorer_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_currency_symbol: Option<String>,
    /// Whether this network was added by a dApp or the user.
    #[serde(default)]
    pub custom: bool,
}

impl Network {
    fn builtin(chain_id: u64, name: &str, rpc: &str, explorer: &str, symbol: &str) -> Self {
        Self {
            chain_id,
            chain_name: name.to_string(),
            rpc_urls: vec![rpc.to_string()],
            block_explorer_urls: vec![explorer.to_string()],
            native_currency_symbol: Some(symbol.to_string()),
            custom: false,
        }
    }
}

/// Chain id of the network selected on first run.
pub const DEFAULT_CHAIN_ID: u64 = 1;

/// Networks that ship with the wallet.
pub fn builtin_networks() -> Vec<Network> {
    vec![
        Network::builtin(
            1,
            "Ethereum Mainnet",
            "https://eth.llamarpc.com",
            "https://etherscan.io",
            "ETH",
        ),
        Network::builtin(
            11_155_111,
            "Sepolia",
            "https://rpc.sepolia.org",
            "https://sepolia.etherscan.io",
            "ETH",
        ),
        Network::builtin(
            137,
            "Polygon",
            "https://polygon-rpc.com",
            "https://polygonscan.com",
            "POL",
        ),
        Network::builtin(
            56,
            "BNB Smart Chain",
            "https://bsc-dataseed.binance.org",
            "https://bscscan.com",
            "BNB",
        ),
        Network::builtin(
            42_161,
            "Arbitrum One",
            "https://arb1.arbitrum.io/rpc",
            "https://arbiscan.io",
            "ETH",
        ),
        Network::builtin(
            10,
            "OP Mainnet",
            "https://mainnet.optimism.io",
            "https://optimistic.etherscan.io",
            "ETH",
        ),
    ]
}

/// Look up a built-in network by chain id.
pub fn find_builtin(chain_id: u64) -> Option<Network> {
    builtin_networks()
        .into_iter()
        .find(|n| n.chain_id == chain_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chain_is_builtin() {
        assert!(find_builtin(DEFAULT_CHAIN_ID).is_some());
    }

    #[test]
    fn builtin_chain_ids_are_unique() {
        let mut ids: Vec<u64> = builtin_networks().iter().map(|n| n.chain_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), builtin_networks().len());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(find_builtin(137)).unwrap_or_default();
        assert_eq!(json["chainId"], 137);
        assert_eq!(json["chainName"], "Polygon");
        assert!(json["rpcUrls"].is_array());
    }
}
