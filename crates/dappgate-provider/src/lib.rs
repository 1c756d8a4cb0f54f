//! dappgate page provider.
//!
//! The EIP-1193-shaped client that runs in a page context. It forwards
//! calls to the background authority over a [`Transport`], correlates the
//! replies, tracks the authorization state and re-emits background pushes
//! as [`ProviderEvent`](dappgate_core::ProviderEvent)s.

pub mod provider;
pub mod transport;

pub use provider::{Provider, ProviderClientState, ProviderConfig, ProviderState};
pub use transport::{Transport, TransportError};
