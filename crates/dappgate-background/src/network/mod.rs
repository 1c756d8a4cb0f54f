//! Selected and user-added networks.

mod manager;

pub use manager::{AddOutcome, NetworkError, NetworkManager, SwitchOutcome};
