//! Internal dispatch endpoints for other services (service token).

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::error::Result;
use crate::notification::{NotificationRecord, OrderEvent};
use crate::server::AppState;
use crate::service::BatchResult;

use super::DataResponse;

/// Request body of the batch endpoint
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub notifications: Vec<OrderEvent>,
}

/// POST /api/notifications/send - Dispatch one event
#[tracing::instrument(name = "http.send_notification", skip(state, event))]
pub async fn send_notification(
    State(state): State<AppState>,
    Json(event): Json<OrderEvent>,
) -> Result<Json<DataResponse<NotificationRecord>>> {
    let record = state.service.send(event).await?;
    Ok(Json(DataResponse::new(record)))
}

/// POST /api/notifications/batch - Dispatch each event independently
#[tracing::instrument(name = "http.send_batch", skip(state, request), fields(count = request.notifications.len()))]
pub async fn send_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<DataResponse<BatchResult>>> {
    let result = state.service.batch(request.notifications).await?;
    Ok(Json(DataResponse::new(result)))
}
