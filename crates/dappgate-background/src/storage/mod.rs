//! Key-value persistence for the background authority.
//!
//! State lives under three keys (`connectedSites`, `selectedNetwork`,
//! `customNetworks`), each holding a JSON document. `SQLite` backs the host
//! binary; [`MemoryStore`] backs tests.

mod db;
mod kv;
mod queries;

pub use db::{Database, DatabaseError};
pub use kv::{KeyValueStore, MemoryStore, keys};
