//! Message envelope and request/response payloads.
//!
//! Tolerant reader: unknown envelope types are returned as-is for the caller
//! to log and skip; unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::errors::RpcError;
use crate::error::{Error, Result};

/// Envelope `type` values.
pub mod message_types {
    pub const REQUEST: &str = "request";
    pub const RESPONSE: &str = "response";
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const CHAIN_CHANGED: &str = "chainChanged";
    pub const ACCOUNTS_CHANGED: &str = "accountsChanged";
}

/// `{ type, data?, id? }` message crossing the transport boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Envelope {
    pub fn new(msg_type: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            msg_type: msg_type.into(),
            data,
            id: None,
        }
    }

    /// Build a correlated RPC request.
    pub fn request(id: impl Into<String>, request: &RpcRequest) -> Self {
        Self {
            msg_type: message_types::REQUEST.to_string(),
            data: Some(json!({ "method": request.method, "params": request.params })),
            id: Some(id.into()),
        }
    }

    /// Build the reply to the request with the given id.
    pub fn response(id: impl Into<String>, result: std::result::Result<Value, RpcError>) -> Self {
        let payload = match result {
            Ok(value) => ResponsePayload {
                result: Some(value),
                error: None,
            },
            Err(error) => ResponsePayload {
                result: None,
                error: Some(error),
            },
        };
        Self {
            msg_type: message_types::RESPONSE.to_string(),
            data: serde_json::to_value(payload).ok(),
            id: Some(id.into()),
        }
    }

    /// Decode the `data` field as `T`.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let data = self.data.clone().unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|e| {
            Error::Protocol(format!("invalid data for '{}': {e}", self.msg_type))
        })
    }

    /// Serialize as a single line (no trailing newline).
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Parse one line of newline-delimited JSON into an envelope.
pub fn parse_line(line: &str) -> Result<Envelope> {
    let raw: Value = serde_json::from_str(line)?;
    if raw.get("type").and_then(Value::as_str).is_none() {
        return Err(Error::Protocol("Missing 'type' field".into()));
    }
    Ok(serde_json::from_value(raw)?)
}

/// `data` of a request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// `data` of a response envelope: exactly one of `result` / `error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsePayload {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl ResponsePayload {
    /// A missing `result` next to a missing `error` is a `null` result, which
    /// is how `wallet_switchEthereumChain` reports success.
    pub fn into_result(self) -> std::result::Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope_shape() {
        let env = Envelope::request("c-1", &RpcRequest::new("eth_chainId", Value::Null));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "request");
        assert_eq!(json["id"], "c-1");
        assert_eq!(json["data"]["method"], "eth_chainId");
    }

    #[test]
    fn null_result_survives_the_wire() {
        let env = Envelope::response("c-2", Ok(Value::Null));
        let line = env.to_line().unwrap();
        let parsed = parse_line(&line).unwrap();
        let payload: ResponsePayload = parsed.data_as().unwrap();
        assert_eq!(payload.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn error_response_decodes() {
        let env = Envelope::response("c-3", Err(RpcError::user_rejected("User rejected")));
        let payload: ResponsePayload = env.data_as().unwrap();
        let err = payload.into_result().unwrap_err();
        assert_eq!(err.code, 4001);
    }

    #[test]
    fn missing_type_is_rejected() {
        assert!(parse_line(r#"{"id":"x"}"#).is_err());
        assert!(parse_line("not json").is_err());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let env = parse_line(r#"{"type":"chainChanged","data":"0x1","extra":true}"#).unwrap();
        assert_eq!(env.msg_type, "chainChanged");
        assert_eq!(env.data, Some(Value::String("0x1".into())));
    }
}
