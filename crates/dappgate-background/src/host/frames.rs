//! Host stdio frames.
//!
//! Inbound lines are envelopes whose `type` names a host command. Outbound
//! lines are either `{"tabId": n, "message": envelope}` for a page context
//! or `{"ui": envelope}` for the approval surface.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use dappgate_core::chain::parse_chain_id;
use dappgate_core::protocol::{Envelope, message_types};

use crate::TabId;
use crate::approval::PendingConnectionRequest;

/// Inbound command types.
pub mod commands {
    pub const APPROVE: &str = "approve";
    pub const REJECT: &str = "reject";
    pub const TAB_UPDATED: &str = "tabUpdated";
    pub const TAB_REMOVED: &str = "tabRemoved";
    pub const SWITCH_NETWORK: &str = "switchNetwork";
    pub const SWITCH_ACCOUNT: &str = "switchAccount";
    pub const DISCONNECT_SITE: &str = "disconnectSite";
}

/// Approval surface message types.
pub mod ui_types {
    pub const SHOW_APPROVAL: &str = "showApproval";
    pub const DISMISS_APPROVAL: &str = "dismissApproval";
}

/// Frame decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Unknown frame type: {0}")]
    UnknownType(String),

    #[error("Request frame without id")]
    MissingId,

    #[error(transparent)]
    Invalid(#[from] dappgate_core::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestData {
    origin: String,
    tab_id: TabId,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproveData {
    request_id: String,
    account: String,
    chain_id: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestIdData {
    request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TabData {
    tab_id: TabId,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainData {
    chain_id: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct AccountData {
    account: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OriginData {
    origin: String,
}

/// A decoded inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    /// RPC call from a page context.
    Request {
        id: String,
        origin: String,
        tab_id: TabId,
        method: String,
        params: Value,
    },
    Approve {
        request_id: String,
        account: String,
        chain_id: u64,
    },
    Reject {
        request_id: String,
    },
    TabUpdated {
        tab_id: TabId,
        url: String,
    },
    TabRemoved {
        tab_id: TabId,
    },
    /// Wallet user picked another network.
    SwitchNetwork {
        chain_id: u64,
    },
    /// Wallet user picked another account.
    SwitchAccount {
        account: String,
    },
    /// Wallet user disconnected a site.
    DisconnectSite {
        origin: String,
    },
}

impl HostCommand {
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, FrameError> {
        let command = match envelope.msg_type.as_str() {
            message_types::REQUEST => {
                let id = envelope.id.clone().ok_or(FrameError::MissingId)?;
                let data: RequestData = envelope.data_as()?;
                Self::Request {
                    id,
                    origin: data.origin,
                    tab_id: data.tab_id,
                    method: data.method,
                    params: data.params,
                }
            }
            commands::APPROVE => {
                let data: ApproveData = envelope.data_as()?;
                Self::Approve {
                    request_id: data.request_id,
                    account: data.account,
                    chain_id: parse_chain_id(&data.chain_id)?,
                }
            }
            commands::REJECT => {
                let data: RequestIdData = envelope.data_as()?;
                Self::Reject {
                    request_id: data.request_id,
                }
            }
            commands::TAB_UPDATED => {
                let data: TabData = envelope.data_as()?;
                Self::TabUpdated {
                    tab_id: data.tab_id,
                    url: data.url,
                }
            }
            commands::TAB_REMOVED => {
                let data: TabData = envelope.data_as()?;
                Self::TabRemoved {
                    tab_id: data.tab_id,
                }
            }
            commands::SWITCH_NETWORK => {
                let data: ChainData = envelope.data_as()?;
                Self::SwitchNetwork {
                    chain_id: parse_chain_id(&data.chain_id)?,
                }
            }
            commands::SWITCH_ACCOUNT => {
                let data: AccountData = envelope.data_as()?;
                Self::SwitchAccount {
                    account: data.account,
                }
            }
            commands::DISCONNECT_SITE => {
                let data: OriginData = envelope.data_as()?;
                Self::DisconnectSite {
                    origin: data.origin,
                }
            }
            other => return Err(FrameError::UnknownType(other.to_string())),
        };
        Ok(command)
    }
}

/// A line written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    #[serde(rename_all = "camelCase")]
    Tab { tab_id: TabId, message: Envelope },
    Ui { ui: Envelope },
}

impl OutboundFrame {
    pub fn show_approval(request: &PendingConnectionRequest) -> Self {
        Self::Ui {
            ui: Envelope::new(
                ui_types::SHOW_APPROVAL,
                serde_json::to_value(request).ok(),
            ),
        }
    }

    pub fn dismiss_approval(request_id: &str) -> Self {
        Self::Ui {
            ui: Envelope::new(
                ui_types::DISMISS_APPROVAL,
                Some(json!({ "requestId": request_id })),
            ),
        }
    }
}
