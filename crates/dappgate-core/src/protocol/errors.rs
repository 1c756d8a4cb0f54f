//! Provider error taxonomy with EIP-1193 / JSON-RPC 2.0 codes.
//!
//! The numeric codes are part of the dApp-facing contract and must not change.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error codes surfaced across the protocol boundary.
pub mod codes {
    // EIP-1193 provider errors
    pub const USER_REJECTED: i32 = 4001;
    pub const UNAUTHORIZED: i32 = 4100;
    pub const UNSUPPORTED_METHOD: i32 = 4200;
    pub const DISCONNECTED: i32 = 4900;
    pub const CHAIN_DISCONNECTED: i32 = 4901;
    // EIP-3085 / wallet_switchEthereumChain
    pub const UNRECOGNIZED_CHAIN: i32 = 4902;

    // JSON-RPC 2.0 standard errors
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Closed classification of every error a dApp can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Explicit decline or timeout of an approval flow.
    UserRejected,
    /// Method requires a permission the origin lacks.
    Unauthorized,
    /// Known but unimplemented method.
    UnsupportedMethod,
    /// No such method.
    MethodNotFound,
    /// No live authorized session.
    Disconnected,
    /// Not connected to the requested chain.
    ChainDisconnected,
    /// Chain id not known to the wallet.
    UnrecognizedChain,
    /// Malformed call arguments.
    InvalidParams,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    pub const fn code(self) -> i32 {
        match self {
            Self::UserRejected => codes::USER_REJECTED,
            Self::Unauthorized => codes::UNAUTHORIZED,
            Self::UnsupportedMethod => codes::UNSUPPORTED_METHOD,
            Self::MethodNotFound => codes::METHOD_NOT_FOUND,
            Self::Disconnected => codes::DISCONNECTED,
            Self::ChainDisconnected => codes::CHAIN_DISCONNECTED,
            Self::UnrecognizedChain => codes::UNRECOGNIZED_CHAIN,
            Self::InvalidParams => codes::INVALID_PARAMS,
            Self::Internal => codes::INTERNAL_ERROR,
        }
    }

    /// Map a wire code back to its kind; unknown codes classify as internal.
    pub const fn from_code(code: i32) -> Self {
        match code {
            codes::USER_REJECTED => Self::UserRejected,
            codes::UNAUTHORIZED => Self::Unauthorized,
            codes::UNSUPPORTED_METHOD => Self::UnsupportedMethod,
            codes::METHOD_NOT_FOUND => Self::MethodNotFound,
            codes::DISCONNECTED => Self::Disconnected,
            codes::CHAIN_DISCONNECTED => Self::ChainDisconnected,
            codes::UNRECOGNIZED_CHAIN => Self::UnrecognizedChain,
            codes::INVALID_PARAMS => Self::InvalidParams,
            _ => Self::Internal,
        }
    }
}

/// Error object carried in a response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: kind.code(),
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::from_code(self.code)
    }

    pub fn user_rejected(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::UserRejected, details)
    }

    pub fn unauthorized(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, details)
    }

    pub fn unsupported_method(method: &str) -> Self {
        Self::new(
            ErrorKind::UnsupportedMethod,
            format!("Method not supported: {method}"),
        )
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorKind::MethodNotFound,
            format!("Method not found: {method}"),
        )
    }

    pub fn disconnected(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::Disconnected, details)
    }

    pub fn chain_disconnected(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::ChainDisconnected, details)
    }

    pub fn unrecognized_chain(chain_id: u64) -> Self {
        Self::new(
            ErrorKind::UnrecognizedChain,
            format!("Unrecognized chain ID {chain_id:#x}"),
        )
    }

    pub fn invalid_params(details: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::InvalidParams,
            format!("Invalid params: {}", details.into()),
        )
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Internal,
            format!("Internal error: {}", details.into()),
        )
    }
}

impl From<crate::error::Error> for RpcError {
    fn from(e: crate::error::Error) -> Self {
        match e {
            crate::error::Error::ChainId(msg) => Self::invalid_params(msg),
            other => Self::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(RpcError::user_rejected("x").code, 4001);
        assert_eq!(RpcError::unauthorized("x").code, 4100);
        assert_eq!(RpcError::unsupported_method("x").code, 4200);
        assert_eq!(RpcError::disconnected("x").code, 4900);
        assert_eq!(RpcError::chain_disconnected("x").code, 4901);
        assert_eq!(RpcError::method_not_found("x").code, -32601);
        assert_eq!(RpcError::invalid_params("x").code, -32602);
        assert_eq!(RpcError::internal("x").code, -32603);
    }

    #[test]
    fn unknown_code_classifies_as_internal() {
        assert_eq!(ErrorKind::from_code(-32000), ErrorKind::Internal);
        assert_eq!(ErrorKind::from_code(4001), ErrorKind::UserRejected);
    }

    #[test]
    fn data_is_omitted_when_absent() {
        let json = serde_json::to_value(RpcError::unauthorized("nope")).unwrap_or_default();
        assert_eq!(json["code"], 4100);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn chain_id_errors_become_invalid_params() {
        let err: RpcError = crate::error::Error::ChainId("0xzz".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
    }
}
