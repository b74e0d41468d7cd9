//! Notification records and the inbound events that produce them.

mod event;
mod types;

pub use event::{display_value, OrderEvent};
pub use types::{
    Channel, NewNotification, NotificationKind, NotificationRecord, NotificationStatus,
    UnknownKind,
};
