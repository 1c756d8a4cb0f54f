//! Chain id parsing and formatting.
//!
//! The canonical wire form is a `0x`-prefixed lowercase hex string. Callers
//! may also send a decimal string or a JSON number; all three parse to the
//! same `u64`. Chain id `0` is never valid.

use serde_json::Value;

use crate::error::{Error, Result};

/// Parse a chain id from a JSON value (hex string, decimal string or number).
pub fn parse_chain_id(value: &Value) -> Result<u64> {
    let id = match value {
        Value::String(s) => parse_chain_id_str(s)?,
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| Error::ChainId(format!("not an unsigned integer: {n}")))?,
        other => return Err(Error::ChainId(format!("unsupported type: {other}"))),
    };

    if id == 0 {
        return Err(Error::ChainId("chain id must be non-zero".into()));
    }
    Ok(id)
}

/// Parse a chain id from its string form.
pub fn parse_chain_id_str(s: &str) -> Result<u64> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex.is_empty() {
            return Err(Error::ChainId(format!("empty hex value: {s}")));
        }
        u64::from_str_radix(hex, 16)
    } else {
        s.parse::<u64>()
    };
    parsed.map_err(|e| Error::ChainId(format!("{s}: {e}")))
}

/// Format a chain id in its canonical `0x`-hex wire form.
pub fn format_chain_id(chain_id: u64) -> String {
    format!("{chain_id:#x}")
}
