//! Connection approval broker.
//!
//! Correlates an asynchronous human decision with the `eth_requestAccounts`
//! call waiting on it. Each flow resolves exactly once: approved, rejected
//! or timed out.

mod broker;
mod types;

pub use broker::{ApprovalBroker, BrokerConfig};
pub use types::{ApprovalError, ApprovalUi, PendingConnectionRequest, UiError};
