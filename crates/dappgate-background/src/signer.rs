//! Signing seam.
//!
//! Key custody lives outside this crate. `PlaceholderSigner` produces a
//! deterministic, well-formed 65-byte signature so the request path can be
//! exercised end to end; it has no cryptographic meaning.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use dappgate_core::protocol::RpcError;

/// Signer errors.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Signing failed: {0}")]
    Failed(String),
}

impl From<SignerError> for RpcError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::UnknownKey(_) => Self::unauthorized(e.to_string()),
            SignerError::Failed(_) => Self::internal(e.to_string()),
        }
    }
}

/// Produces signatures for a key identified by `key_handle` (an address).
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign `payload`, returning a `0x`-prefixed hex signature.
    async fn sign(&self, payload: &[u8], key_handle: &str) -> Result<String, SignerError>;
}

/// Deterministic stand-in for a real key store.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderSigner;

#[async_trait]
impl Signer for PlaceholderSigner {
    async fn sign(&self, payload: &[u8], key_handle: &str) -> Result<String, SignerError> {
        if key_handle.is_empty() {
            return Err(SignerError::UnknownKey(String::new()));
        }
        let r = Sha256::new()
            .chain_update(key_handle.to_lowercase().as_bytes())
            .chain_update(payload)
            .finalize();
        let s = Sha256::digest(r);

        let mut signature = Vec::with_capacity(65);
        signature.extend_from_slice(&r);
        signature.extend_from_slice(&s);
        signature.push(27);
        Ok(format!("0x{}", hex::encode(signature)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn placeholder_signature_is_65_bytes() {
        let sig = PlaceholderSigner.sign(b"hello", "0xabc").await.unwrap();
        assert!(sig.starts_with("0x"));
        assert_eq!(sig.len(), 2 + 65 * 2);
        assert!(sig.ends_with("1b"));
    }

    #[tokio::test]
    async fn placeholder_is_deterministic_per_key() {
        let a = PlaceholderSigner.sign(b"msg", "0xAbC").await.unwrap();
        let b = PlaceholderSigner.sign(b"msg", "0xabc").await.unwrap();
        let c = PlaceholderSigner.sign(b"msg", "0xdef").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn empty_key_is_refused() {
        assert!(matches!(
            PlaceholderSigner.sign(b"msg", "").await,
            Err(SignerError::UnknownKey(_))
        ));
    }
}
