//! Typed provider events pushed from the background to page contexts.

use serde_json::{Value, json};

use super::envelope::{Envelope, message_types};
use super::errors::{ErrorKind, RpcError};

/// Closed set of events a page-side provider can observe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Provider became able to serve requests for `chain_id` (hex).
    Connect { chain_id: String },
    /// Provider lost its authorized session.
    Disconnect { error: RpcError },
    /// Active chain changed; `chain_id` is hex.
    ChainChanged { chain_id: String },
    /// Exposed accounts changed; empty means none.
    AccountsChanged { accounts: Vec<String> },
}

impl ProviderEvent {
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => message_types::CONNECT,
            Self::Disconnect { .. } => message_types::DISCONNECT,
            Self::ChainChanged { .. } => message_types::CHAIN_CHANGED,
            Self::AccountsChanged { .. } => message_types::ACCOUNTS_CHANGED,
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        let data = match self {
            Self::Connect { chain_id } => json!({ "chainId": chain_id }),
            Self::Disconnect { error } => {
                serde_json::to_value(error).unwrap_or_else(|_| json!({ "code": error.code }))
            }
            Self::ChainChanged { chain_id } => Value::String(chain_id.clone()),
            Self::AccountsChanged { accounts } => json!(accounts),
        };
        Envelope::new(self.event_name(), Some(data))
    }

    /// Decode an event push; returns `None` for non-event envelopes.
    pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
        let data = envelope.data.as_ref();
        match envelope.msg_type.as_str() {
            message_types::CONNECT => {
                let chain_id = data?.get("chainId")?.as_str()?.to_string();
                Some(Self::Connect { chain_id })
            }
            message_types::DISCONNECT => {
                let error = data
                    .and_then(|d| serde_json::from_value(d.clone()).ok())
                    .unwrap_or_else(|| {
                        RpcError::new(ErrorKind::Disconnected, "Provider disconnected")
                    });
                Some(Self::Disconnect { error })
            }
            message_types::CHAIN_CHANGED => {
                let chain_id = data?.as_str()?.to_string();
                Some(Self::ChainChanged { chain_id })
            }
            message_types::ACCOUNTS_CHANGED => {
                let accounts = serde_json::from_value(data?.clone()).ok()?;
                Some(Self::AccountsChanged { accounts })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn chain_changed_carries_bare_hex() {
        let env = ProviderEvent::ChainChanged {
            chain_id: "0x89".into(),
        }
        .to_envelope();
        assert_eq!(env.msg_type, "chainChanged");
        assert_eq!(env.data, Some(Value::String("0x89".into())));
    }

    #[test]
    fn disconnect_without_data_defaults_to_4900() {
        let env = Envelope::new("disconnect", None);
        let Some(ProviderEvent::Disconnect { error }) = ProviderEvent::from_envelope(&env) else {
            panic!("expected disconnect");
        };
        assert_eq!(error.code, 4900);
    }

    #[test]
    fn response_envelopes_are_not_events() {
        let env = Envelope::response("1", Ok(Value::Null));
        assert!(ProviderEvent::from_envelope(&env).is_none());
    }

    #[test]
    fn accounts_changed_decodes_list() {
        let env = Envelope::new("accountsChanged", Some(json!(["0xabc"])));
        assert_eq!(
            ProviderEvent::from_envelope(&env),
            Some(ProviderEvent::AccountsChanged {
                accounts: vec!["0xabc".into()]
            })
        );
    }
}
