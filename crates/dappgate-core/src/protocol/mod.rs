//! Wire protocol shared by the background authority and the page provider.
//!
//! Every message crossing the transport boundary is an [`Envelope`]
//! (`{type, data?, id?}`). Requests and responses correlate by `id`; event
//! pushes carry one of the typed [`ProviderEvent`] kinds.

mod envelope;
mod errors;
mod events;

pub use envelope::{Envelope, ResponsePayload, RpcRequest, message_types, parse_line};
pub use errors::{ErrorKind, RpcError, codes};
pub use events::ProviderEvent;

/// Method names understood by the background dispatcher.
pub mod methods {
    pub const REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
    pub const ACCOUNTS: &str = "eth_accounts";
    pub const CHAIN_ID: &str = "eth_chainId";
    pub const NET_VERSION: &str = "net_version";
    pub const SWITCH_CHAIN: &str = "wallet_switchEthereumChain";
    pub const ADD_CHAIN: &str = "wallet_addEthereumChain";
    pub const PERSONAL_SIGN: &str = "personal_sign";
    pub const SIGN_TYPED_DATA_V4: &str = "eth_signTypedData_v4";
    pub const SEND_TRANSACTION: &str = "eth_sendTransaction";
    pub const GET_PERMISSIONS: &str = "wallet_getPermissions";
    pub const REVOKE_PERMISSIONS: &str = "wallet_revokePermissions";
}

/// Capability tag granted by a successful connection approval.
pub const CONNECTED_PERMISSION: &str = "connected";
