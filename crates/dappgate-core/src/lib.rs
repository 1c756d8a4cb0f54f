//! `dappgate` Core Library
//!
//! Shared functionality for the background authority and the page provider:
//! - Wire protocol: message envelope, provider events, RPC error codes
//! - Chain id parsing and the built-in network table
//! - Origin extraction for tab URLs
//! - Configuration resolution and hierarchy
//! - Database helpers and tracing initialisation

pub mod chain;
pub mod config;
pub mod db;
pub mod error;
pub mod network;
pub mod origin;
pub mod protocol;
pub mod tracing_init;

pub use chain::{format_chain_id, parse_chain_id};
pub use config::Config;
pub use error::{Error, Result};
pub use network::Network;
pub use protocol::{Envelope, ErrorKind, ProviderEvent, RpcError};
