use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use crate::server::middleware::service_token_auth;
use crate::server::AppState;

use super::{
    delete_notification, get_notification, get_preferences, health, list_notifications,
    mark_as_read, prometheus_metrics, send_batch, send_notification, send_test_notification,
    update_preferences,
};

pub const BASE_PATH: &str = "/api/notifications";

pub fn api_routes(state: AppState) -> Router<AppState> {
    let path = |suffix: &str| format!("{}{}", BASE_PATH, suffix);

    // Internal callers authenticate with the shared service token
    let internal = Router::new()
        .route(&path("/send"), post(send_notification))
        .route(&path("/batch"), post(send_batch))
        .route_layer(middleware::from_fn_with_state(state, service_token_auth));

    Router::new()
        // Health & metrics
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route(&path("/health"), get(health))
        // User routes (bearer JWT, see AuthUser)
        .route(BASE_PATH, get(list_notifications))
        .route(&path("/"), get(list_notifications))
        .route(
            &path("/preferences"),
            get(get_preferences).put(update_preferences),
        )
        .route(&path("/test"), post(send_test_notification))
        .route(
            &path("/{id}"),
            get(get_notification).delete(delete_notification),
        )
        .route(&path("/{id}/read"), patch(mark_as_read))
        .merge(internal)
}
