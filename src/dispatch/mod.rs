//! Dispatch engine: turns one inbound event into a persisted notification
//! record and fans it out over the user's enabled channels.

mod engine;

use thiserror::Error;

use crate::store::StoreError;

pub use engine::{ChannelOutcome, DispatchEngine, DispatchStats, DispatchStatsSnapshot};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The event cannot produce a notification; retrying will not help.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Persistence failed; the event should be redelivered.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Store(_))
    }
}
