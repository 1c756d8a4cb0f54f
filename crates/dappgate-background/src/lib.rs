//! dappgate background authority.
//!
//! Owns every origin's authorization state and serves page RPC calls:
//! - [`permission`]: durable `origin → ConnectedSite` store
//! - [`approval`]: human approval flow for `eth_requestAccounts`
//! - [`rpc`]: method registry, permission gate and built-in handlers
//! - [`broadcast`]: chain, account and disconnect pushes to open tabs
//! - [`network`]: selected and user-added networks
//! - [`host`]: line-delimited JSON transport used by the `dappgate-host` binary

pub mod approval;
pub mod broadcast;
pub mod host;
pub mod network;
pub mod permission;
pub mod rpc;
pub mod signer;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

/// Browser tab identifier.
pub type TabId = u32;
