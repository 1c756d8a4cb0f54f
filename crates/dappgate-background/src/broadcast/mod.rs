//! Notification broadcaster: pushes provider events to every tab of every
//! connected origin.

mod broadcaster;
mod types;

pub use broadcaster::NotificationBroadcaster;
pub use types::{BroadcastReport, DeliveryError, TabInfo, TabMessenger};
