//! Built-in method handlers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use dappgate_core::chain::parse_chain_id;
use dappgate_core::protocol::{RpcError, methods};
use dappgate_core::{Network, format_chain_id};

use super::types::{CallContext, MethodHandler};
use crate::approval::ApprovalBroker;
use crate::broadcast::{BroadcastReport, NotificationBroadcaster};
use crate::network::{AddOutcome, NetworkManager, SwitchOutcome};
use crate::permission::{ConnectedSite, PermissionStore};
use crate::signer::Signer;

/// Collaborators shared by the built-in handlers.
pub struct Services {
    pub store: Arc<PermissionStore>,
    pub broker: Arc<ApprovalBroker>,
    pub networks: Arc<NetworkManager>,
    pub broadcaster: Arc<NotificationBroadcaster>,
    pub signer: Arc<dyn Signer>,
}

/// The methods every dispatcher starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    RequestAccounts,
    Accounts,
    ChainId,
    NetVersion,
    SwitchChain,
    AddChain,
    PersonalSign,
    SignTypedData,
    SendTransaction,
    GetPermissions,
    RevokePermissions,
}

impl Builtin {
    pub const ALL: [Self; 11] = [
        Self::RequestAccounts,
        Self::Accounts,
        Self::ChainId,
        Self::NetVersion,
        Self::SwitchChain,
        Self::AddChain,
        Self::PersonalSign,
        Self::SignTypedData,
        Self::SendTransaction,
        Self::GetPermissions,
        Self::RevokePermissions,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::RequestAccounts => methods::REQUEST_ACCOUNTS,
            Self::Accounts => methods::ACCOUNTS,
            Self::ChainId => methods::CHAIN_ID,
            Self::NetVersion => methods::NET_VERSION,
            Self::SwitchChain => methods::SWITCH_CHAIN,
            Self::AddChain => methods::ADD_CHAIN,
            Self::PersonalSign => methods::PERSONAL_SIGN,
            Self::SignTypedData => methods::SIGN_TYPED_DATA_V4,
            Self::SendTransaction => methods::SEND_TRANSACTION,
            Self::GetPermissions => methods::GET_PERMISSIONS,
            Self::RevokePermissions => methods::REVOKE_PERMISSIONS,
        }
    }

    /// Whether the origin must hold `connected` before the handler runs.
    pub const fn requires_connection(self) -> bool {
        matches!(
            self,
            Self::RequestAccounts
                | Self::SwitchChain
                | Self::AddChain
                | Self::PersonalSign
                | Self::SignTypedData
                | Self::SendTransaction
        )
    }
}

pub struct BuiltinHandler {
    method: Builtin,
    services: Arc<Services>,
}

impl BuiltinHandler {
    pub const fn new(method: Builtin, services: Arc<Services>) -> Self {
        Self { method, services }
    }
}

#[async_trait]
impl MethodHandler for BuiltinHandler {
    async fn call(&self, params: Value, ctx: &CallContext) -> Result<Value, RpcError> {
        let s = &*self.services;
        match self.method {
            Builtin::RequestAccounts => request_accounts(s, ctx).await,
            Builtin::Accounts => Ok(accounts(s, ctx).await),
            Builtin::ChainId => Ok(Value::String(format_chain_id(current_chain(s, ctx).await))),
            Builtin::NetVersion => Ok(Value::String(current_chain(s, ctx).await.to_string())),
            Builtin::SwitchChain => switch_chain(s, &params).await,
            Builtin::AddChain => add_chain(s, &params).await,
            Builtin::PersonalSign => personal_sign(s, &params, ctx).await,
            Builtin::SignTypedData => sign_typed_data(s, &params, ctx).await,
            Builtin::SendTransaction => Err(RpcError::unsupported_method(methods::SEND_TRANSACTION)),
            Builtin::GetPermissions => Ok(get_permissions(s, ctx).await),
            Builtin::RevokePermissions => revoke_permissions(s, ctx).await,
        }
    }
}

async fn request_accounts(s: &Services, ctx: &CallContext) -> Result<Value, RpcError> {
    if let Some(site) = s.store.get(&ctx.origin).await {
        debug!(origin = %ctx.origin, "Origin already connected");
        return Ok(json!([site.account]));
    }
    let accounts = s
        .broker
        .request_approval(&ctx.origin, ctx.tab_id)
        .await
        .map_err(RpcError::from)?;
    Ok(json!(accounts))
}

async fn accounts(s: &Services, ctx: &CallContext) -> Value {
    s.store
        .get(&ctx.origin)
        .await
        .map_or_else(|| json!([]), |site| json!([site.account]))
}

/// Chain observed by the origin: its own if connected, else the wallet's.
async fn current_chain(s: &Services, ctx: &CallContext) -> u64 {
    match s.store.get(&ctx.origin).await {
        Some(site) => site.chain_id,
        None => s.networks.selected().await.chain_id,
    }
}

async fn switch_chain(s: &Services, params: &Value) -> Result<Value, RpcError> {
    let raw = first_param(params)?
        .get("chainId")
        .ok_or_else(|| RpcError::invalid_params("missing chainId"))?;
    let chain_id = parse_chain_id(raw)?;

    apply_chain_switch(&s.networks, &s.broadcaster, chain_id).await?;
    Ok(Value::Null)
}

/// Select `chain_id` and move every site that is not on it yet.
///
/// Sites already on the chain get no push. If the sites cannot be written,
/// the previous selection is restored.
pub(crate) async fn apply_chain_switch(
    networks: &NetworkManager,
    broadcaster: &NotificationBroadcaster,
    chain_id: u64,
) -> Result<BroadcastReport, RpcError> {
    let outcome = networks.select(chain_id).await?;
    if let SwitchOutcome::Switched { previous, network } = &outcome {
        info!(previous, chain_id, name = %network.chain_name, "Switching chain for all sites");
    }

    match broadcaster.broadcast_chain_changed(chain_id).await {
        Ok(report) => Ok(report),
        Err(e) => {
            if let SwitchOutcome::Switched { previous, .. } = outcome
                && let Err(restore) = networks.select(previous).await
            {
                warn!(previous, error = %restore, "Failed to restore previous network");
            }
            Err(e.into())
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddChainParams {
    chain_id: Value,
    chain_name: String,
    rpc_urls: Vec<String>,
    #[serde(default)]
    block_explorer_urls: Option<Vec<String>>,
    #[serde(default)]
    native_currency: Option<NativeCurrency>,
}

#[derive(Debug, Deserialize)]
struct NativeCurrency {
    symbol: String,
}

async fn add_chain(s: &Services, params: &Value) -> Result<Value, RpcError> {
    let parsed: AddChainParams = serde_json::from_value(first_param(params)?.clone())
        .map_err(|e| RpcError::invalid_params(e.to_string()))?;
    let network = Network {
        chain_id: parse_chain_id(&parsed.chain_id)?,
        chain_name: parsed.chain_name,
        rpc_urls: parsed.rpc_urls,
        block_explorer_urls: parsed.block_explorer_urls.unwrap_or_default(),
        native_currency_symbol: parsed.native_currency.map(|c| c.symbol),
        custom: true,
    };

    let chain_id = network.chain_id;
    if s.networks.add_custom(network).await? == AddOutcome::AlreadyPresent {
        debug!(chain_id, "Chain already known; nothing added");
    }
    Ok(Value::Null)
}

async fn personal_sign(s: &Services, params: &Value, ctx: &CallContext) -> Result<Value, RpcError> {
    let message = str_param(params, 0, "message")?;
    let address = str_param(params, 1, "address")?;
    let site = require_account(s, ctx, address).await?;

    let payload = decode_message(message);
    let signature = s.signer.sign(&payload, &site.account).await?;
    Ok(Value::String(signature))
}

async fn sign_typed_data(
    s: &Services,
    params: &Value,
    ctx: &CallContext,
) -> Result<Value, RpcError> {
    let address = str_param(params, 0, "address")?;
    let typed_data = match params.get(1) {
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw)
            .map_err(|e| RpcError::invalid_params(format!("typedData: {e}")))?,
        Some(obj @ Value::Object(_)) => obj.clone(),
        _ => return Err(RpcError::invalid_params("typedData must be an object")),
    };
    let site = require_account(s, ctx, address).await?;

    let signature = s
        .signer
        .sign(typed_data.to_string().as_bytes(), &site.account)
        .await?;
    Ok(Value::String(signature))
}

async fn get_permissions(s: &Services, ctx: &CallContext) -> Value {
    let Some(site) = s.store.get(&ctx.origin).await else {
        return json!([]);
    };
    json!([{
        "invoker": site.origin,
        "parentCapability": methods::ACCOUNTS,
        "date": site.connected_at.saturating_mul(1000),
        "caveats": [{
            "type": "restrictReturnedAccounts",
            "value": [site.account],
        }],
    }])
}

async fn revoke_permissions(s: &Services, ctx: &CallContext) -> Result<Value, RpcError> {
    if s.store.remove(&ctx.origin).await?.is_some() {
        s.broadcaster.notify_disconnect(&ctx.origin).await;
    }
    Ok(Value::Null)
}

/// The connected site for `ctx`, provided `address` is the account it sees.
async fn require_account(
    s: &Services,
    ctx: &CallContext,
    address: &str,
) -> Result<ConnectedSite, RpcError> {
    let site = s
        .store
        .get(&ctx.origin)
        .await
        .ok_or_else(|| RpcError::unauthorized("Origin is not connected"))?;
    if !site.account.eq_ignore_ascii_case(address) {
        warn!(origin = %ctx.origin, address, "Signing requested for foreign account");
        return Err(RpcError::unauthorized(
            "Requested account is not authorized for this origin",
        ));
    }
    Ok(site)
}

fn first_param(params: &Value) -> Result<&Value, RpcError> {
    match params {
        Value::Array(list) => list
            .first()
            .ok_or_else(|| RpcError::invalid_params("expected one parameter")),
        Value::Object(_) => Ok(params),
        _ => Err(RpcError::invalid_params("expected a parameter list")),
    }
}

fn str_param<'a>(params: &'a Value, index: usize, name: &str) -> Result<&'a str, RpcError> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params(format!("{name} must be a string")))
}

/// `0x`-hex messages are signed as bytes; anything else as UTF-8 text.
fn decode_message(message: &str) -> Vec<u8> {
    message
        .strip_prefix("0x")
        .and_then(|h| hex::decode(h).ok())
        .unwrap_or_else(|| message.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_unique() {
        let mut names: Vec<_> = Builtin::ALL.iter().map(|b| b.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Builtin::ALL.len());
    }

    #[test]
    fn read_only_methods_need_no_connection() {
        assert!(!Builtin::Accounts.requires_connection());
        assert!(!Builtin::ChainId.requires_connection());
        assert!(!Builtin::GetPermissions.requires_connection());
        assert!(Builtin::SendTransaction.requires_connection());
    }

    #[test]
    fn hex_messages_decode_to_bytes() {
        assert_eq!(decode_message("0x6869"), b"hi".to_vec());
        assert_eq!(decode_message("hello"), b"hello".to_vec());
        assert_eq!(decode_message("0xzz"), b"0xzz".to_vec());
    }

    #[test]
    fn first_param_accepts_list_or_object() {
        let list = json!([{"chainId": "0x1"}]);
        assert_eq!(first_param(&list).ok(), Some(&json!({"chainId": "0x1"})));
        assert!(first_param(&json!([])).is_err());
        assert!(first_param(&json!("0x1")).is_err());
    }
}
