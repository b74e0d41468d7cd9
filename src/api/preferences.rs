//! Preference endpoints and the self-addressed test notification.

use axum::{extract::State, Json};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::notification::NotificationRecord;
use crate::preference::{PreferenceProfile, PreferenceUpdate};
use crate::server::AppState;

use super::DataResponse;

/// GET /api/notifications/preferences - Creates defaults on first access
#[tracing::instrument(name = "http.get_preferences", skip(state, user), fields(user_id = %user.user_id))]
pub async fn get_preferences(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<DataResponse<PreferenceProfile>>> {
    let profile = state.service.get_preferences(&user.user_id).await?;
    Ok(Json(DataResponse::new(profile)))
}

/// PUT /api/notifications/preferences - Merge a partial update
#[tracing::instrument(name = "http.update_preferences", skip(state, user, update), fields(user_id = %user.user_id))]
pub async fn update_preferences(
    State(state): State<AppState>,
    user: AuthUser,
    Json(update): Json<PreferenceUpdate>,
) -> Result<Json<DataResponse<PreferenceProfile>>> {
    let profile = state
        .service
        .update_preferences(&user.user_id, update)
        .await?;
    Ok(Json(DataResponse::new(profile)))
}

/// POST /api/notifications/test - Dispatch a sample notification to the caller
#[tracing::instrument(name = "http.send_test_notification", skip(state, user), fields(user_id = %user.user_id))]
pub async fn send_test_notification(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<DataResponse<NotificationRecord>>> {
    let record = state
        .service
        .send_test(&user.user_id, user.email.as_deref())
        .await?;
    Ok(Json(DataResponse::new(record)))
}
