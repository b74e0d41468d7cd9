//! API layer - HTTP endpoint handlers organized by domain.

mod health;
mod internal;
mod metrics;
mod notifications;
mod preferences;
mod routes;

use serde::Serialize;

pub use health::health;
pub use internal::{send_batch, send_notification};
pub use metrics::prometheus_metrics;
pub use notifications::{delete_notification, get_notification, list_notifications, mark_as_read};
pub use preferences::{get_preferences, send_test_notification, update_preferences};
pub use routes::{api_routes, BASE_PATH};

/// Success envelope for single-resource responses
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { success: true, data }
    }
}
