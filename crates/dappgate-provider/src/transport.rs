//! Page-to-background transport seam.

use async_trait::async_trait;

use dappgate_core::protocol::Envelope;

/// Failure to hand a message to the background.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Transport unavailable: {0}")]
pub struct TransportError(pub String);

/// Outbound path from the page to the background authority.
///
/// Replies and pushes come back through
/// [`Provider::handle_message`](crate::Provider::handle_message).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, envelope: Envelope) -> Result<(), TransportError>;
}
