//! Per-origin permission store.
//!
//! Owns every `ConnectedSite` record. Other components read and write
//! authorization state only through [`PermissionStore`].

mod store;
mod types;

pub use store::PermissionStore;
pub use types::{ConnectedSite, StoreError};
