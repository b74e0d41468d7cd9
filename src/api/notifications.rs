//! Record endpoints for the authenticated user.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::notification::{NotificationKind, NotificationRecord, NotificationStatus};
use crate::server::AppState;
use crate::service::NotificationList;
use crate::store::{Pagination, RecordFilter};

use super::DataResponse;

/// Query string of the listing endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    pub is_read: Option<bool>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListParams {
    pub fn filter(&self) -> Result<RecordFilter> {
        let kind = match non_empty(&self.kind) {
            Some(kind) => Some(
                kind.parse::<NotificationKind>()
                    .map_err(|e| AppError::Validation(e.to_string()))?,
            ),
            None => None,
        };
        let status = match non_empty(&self.status) {
            Some(status) => Some(
                status
                    .parse::<NotificationStatus>()
                    .map_err(AppError::Validation)?,
            ),
            None => None,
        };

        Ok(RecordFilter {
            kind,
            status,
            is_read: self.is_read,
            created_from: non_empty(&self.start_date)
                .map(|d| parse_date(d, NaiveTime::MIN))
                .transpose()?,
            created_to: non_empty(&self.end_date)
                .map(|d| parse_date(d, end_of_day()))
                .transpose()?,
        })
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN)
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` date taken at `time_of_day`.
fn parse_date(value: &str, time_of_day: NaiveTime) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_time(time_of_day).and_utc())
        .map_err(|_| AppError::Validation(format!("Invalid date: {}", value)))
}

/// Unparseable ids cannot name a record, so they read as not found.
fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| AppError::NotFound(format!("Notification {} not found", id)))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// GET /api/notifications - List the caller's notifications
#[tracing::instrument(name = "http.list_notifications", skip(state, user, params), fields(user_id = %user.user_id))]
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<NotificationList>> {
    let list = state
        .service
        .list(&user.user_id, params.filter()?, params.pagination())
        .await?;
    Ok(Json(list))
}

/// GET /api/notifications/{id}
#[tracing::instrument(name = "http.get_notification", skip(state, user), fields(user_id = %user.user_id))]
pub async fn get_notification(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<NotificationRecord>>> {
    let record = state.service.get(&user.user_id, parse_id(&id)?).await?;
    Ok(Json(DataResponse::new(record)))
}

/// PATCH /api/notifications/{id}/read
#[tracing::instrument(name = "http.mark_as_read", skip(state, user), fields(user_id = %user.user_id))]
pub async fn mark_as_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<NotificationRecord>>> {
    let record = state.service.mark_read(&user.user_id, parse_id(&id)?).await?;
    Ok(Json(DataResponse::new(record)))
}

/// DELETE /api/notifications/{id}
#[tracing::instrument(name = "http.delete_notification", skip(state, user), fields(user_id = %user.user_id))]
pub async fn delete_notification(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.service.delete(&user.user_id, parse_id(&id)?).await?;
    Ok(Json(DeleteResponse {
        success: true,
        message: "Notification deleted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_from_params() {
        let params = ListParams {
            kind: Some("STOP_LOSS".to_string()),
            status: Some("SENT".to_string()),
            is_read: Some(false),
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-01-31T12:00:00Z".to_string()),
            ..Default::default()
        };

        let filter = params.filter().unwrap();
        assert_eq!(filter.kind, Some(NotificationKind::StopLoss));
        assert_eq!(filter.status, Some(NotificationStatus::Sent));
        assert_eq!(filter.is_read, Some(false));
        assert_eq!(
            filter.created_from.unwrap().to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
        assert!(filter.date_range().is_some());
    }

    #[test]
    fn test_bare_end_date_covers_whole_day() {
        let params = ListParams {
            end_date: Some("2024-02-29".to_string()),
            ..Default::default()
        };
        let to = params.filter().unwrap().created_to.unwrap();
        assert_eq!(to.format("%H:%M:%S").to_string(), "23:59:59");
        assert_eq!(to.timestamp_subsec_millis(), 999);
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let bad_kind = ListParams {
            kind: Some("MARGIN_CALL".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad_kind.filter(), Err(AppError::Validation(_))));

        let bad_date = ListParams {
            start_date: Some("yesterday".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad_date.filter(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_blank_params_are_ignored() {
        let params = ListParams {
            kind: Some(String::new()),
            status: Some(" ".to_string()),
            ..Default::default()
        };
        let filter = params.filter().unwrap();
        assert!(filter.kind.is_none() && filter.status.is_none());
        assert_eq!(params.pagination(), Pagination::default());
    }

    #[test]
    fn test_unparseable_id_is_not_found() {
        assert!(matches!(parse_id("5f7d1e3b9d31162e78d5b1f5"), Err(AppError::NotFound(_))));
    }
}
