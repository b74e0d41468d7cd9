//! Notification facade: the record and preference operations exposed over
//! HTTP, plus direct dispatch of events submitted by other services.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::dispatch::{DispatchEngine, DispatchError};
use crate::error::{AppError, Result};
use crate::notification::{NotificationKind, NotificationRecord, NotificationStatus, OrderEvent};
use crate::preference::{PreferenceProfile, PreferenceUpdate};
use crate::store::{NotificationStore, Pagination, PreferenceStore, RecordFilter, Stores};

/// Maximum number of events accepted by one batch call
pub const MAX_BATCH_SIZE: usize = 100;

/// Subject id used for self-addressed test notifications
const TEST_SUBJECT_ID: &str = "test";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationList {
    pub notifications: Vec<NotificationRecord>,
    pub unread_count: u64,
    pub pagination: PageInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

/// Outcome of one batch item
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<NotificationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub results: Vec<BatchItemResult>,
    pub summary: BatchSummary,
}

#[derive(Clone)]
pub struct NotificationService {
    notifications: Arc<dyn NotificationStore>,
    preferences: Arc<dyn PreferenceStore>,
    engine: Arc<DispatchEngine>,
}

impl NotificationService {
    pub fn new(stores: Stores, engine: Arc<DispatchEngine>) -> Self {
        Self {
            notifications: stores.notifications,
            preferences: stores.preferences,
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<DispatchEngine> {
        &self.engine
    }

    #[tracing::instrument(name = "service.list", skip(self, filter))]
    pub async fn list(
        &self,
        user_id: &str,
        filter: RecordFilter,
        pagination: Pagination,
    ) -> Result<NotificationList> {
        let page = self
            .notifications
            .query_records(user_id, &filter, pagination)
            .await?;

        Ok(NotificationList {
            notifications: page.records,
            unread_count: page.unread,
            pagination: PageInfo {
                page: pagination.page,
                limit: pagination.limit,
                total: page.total,
                pages: pagination.pages(page.total),
            },
        })
    }

    #[tracing::instrument(name = "service.get", skip(self))]
    pub async fn get(&self, user_id: &str, id: Uuid) -> Result<NotificationRecord> {
        self.notifications
            .get_record(user_id, id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    #[tracing::instrument(name = "service.mark_read", skip(self))]
    pub async fn mark_read(&self, user_id: &str, id: Uuid) -> Result<NotificationRecord> {
        self.notifications
            .mark_read(user_id, id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    #[tracing::instrument(name = "service.delete", skip(self))]
    pub async fn delete(&self, user_id: &str, id: Uuid) -> Result<()> {
        if self.notifications.delete_record(user_id, id).await? {
            Ok(())
        } else {
            Err(not_found(id))
        }
    }

    /// The user's profile, created with defaults on first access.
    #[tracing::instrument(name = "service.get_preferences", skip(self))]
    pub async fn get_preferences(&self, user_id: &str) -> Result<PreferenceProfile> {
        if let Some(profile) = self.preferences.get_profile(user_id).await? {
            return Ok(profile);
        }

        let inserted = self
            .preferences
            .insert_profile_if_absent(PreferenceProfile::default_for(user_id, None))
            .await?;
        if inserted.created {
            tracing::info!("Created default notification preferences");
        }
        Ok(inserted.profile)
    }

    #[tracing::instrument(name = "service.update_preferences", skip(self, update))]
    pub async fn update_preferences(
        &self,
        user_id: &str,
        update: PreferenceUpdate,
    ) -> Result<PreferenceProfile> {
        update.validate()?;
        let profile = self.preferences.upsert_profile(user_id, &update).await?;
        tracing::info!("Notification preferences updated");
        Ok(profile)
    }

    /// Dispatch a sample notification to the caller through their own
    /// preferences.
    #[tracing::instrument(name = "service.send_test", skip(self, email))]
    pub async fn send_test(&self, user_id: &str, email: Option<&str>) -> Result<NotificationRecord> {
        let mut event = OrderEvent::new(user_id, TEST_SUBJECT_ID)
            .kind(NotificationKind::OrderExecuted)
            .symbol("TEST/USD")
            .side("BUY")
            .price(100.0)
            .quantity(1.0);
        if let Some(email) = email {
            event = event.user_email(email);
        }
        Ok(self.engine.process_event(event).await?)
    }

    #[tracing::instrument(name = "service.send", skip(self, event))]
    pub async fn send(&self, event: OrderEvent) -> Result<NotificationRecord> {
        Ok(self.engine.process_event(event).await?)
    }

    /// Dispatch each event independently; one failure does not stop the rest.
    #[tracing::instrument(name = "service.batch", skip(self, events), fields(count = events.len()))]
    pub async fn batch(&self, events: Vec<OrderEvent>) -> Result<BatchResult> {
        if events.is_empty() {
            return Err(AppError::Validation("notifications must not be empty".to_string()));
        }
        if events.len() > MAX_BATCH_SIZE {
            return Err(AppError::Validation(format!(
                "at most {} notifications per batch, got {}",
                MAX_BATCH_SIZE,
                events.len()
            )));
        }

        let mut results = Vec::with_capacity(events.len());
        for (index, event) in events.into_iter().enumerate() {
            let item = match self.engine.process_event(event).await {
                Ok(record) => BatchItemResult {
                    index,
                    success: true,
                    notification_id: Some(record.id),
                    status: Some(record.status),
                    error: None,
                },
                Err(e) => BatchItemResult {
                    index,
                    success: false,
                    notification_id: None,
                    status: None,
                    error: Some(batch_error_message(&e)),
                },
            };
            results.push(item);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        let summary = BatchSummary {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        };
        tracing::info!(succeeded = summary.succeeded, failed = summary.failed, "Batch dispatched");

        Ok(BatchResult { results, summary })
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Notification {} not found", id))
}

fn batch_error_message(err: &DispatchError) -> String {
    match err {
        DispatchError::InvalidEvent(msg) => msg.clone(),
        DispatchError::Store(_) => "Storage unavailable".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ChannelProviders;

    fn service() -> NotificationService {
        let stores = Stores::in_memory();
        let engine = Arc::new(DispatchEngine::new(stores.clone(), ChannelProviders::logging()).unwrap());
        NotificationService::new(stores, engine)
    }

    #[tokio::test]
    async fn test_get_preferences_creates_default_once() {
        let service = service();

        let first = service.get_preferences("u1").await.unwrap();
        assert!(first.email.enabled);
        assert_eq!(first.email.address, "");

        let second = service.get_preferences("u1").await.unwrap();
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn test_update_preferences_rejects_bad_email() {
        let service = service();
        let update: PreferenceUpdate =
            serde_json::from_value(serde_json::json!({"email": {"address": "not an email"}}))
                .unwrap();

        let err = service.update_preferences("u1", update).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_record_operations_are_owner_scoped() {
        let service = service();
        let record = service
            .send(OrderEvent::new("owner", "s1").user_email("o@example.com"))
            .await
            .unwrap();
        assert_eq!(record.status, NotificationStatus::Sent);

        assert!(matches!(
            service.get("intruder", record.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.delete("intruder", record.id).await,
            Err(AppError::NotFound(_))
        ));

        let read = service.mark_read("owner", record.id).await.unwrap();
        assert!(read.is_read);

        let list = service
            .list("owner", RecordFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(list.unread_count, 0);
        assert_eq!(list.pagination.total, 1);

        service.delete("owner", record.id).await.unwrap();
        assert!(service.get("owner", record.id).await.is_err());
    }

    #[tokio::test]
    async fn test_send_test_uses_callers_email() {
        let service = service();
        let record = service.send_test("u9", Some("u9@example.com")).await.unwrap();
        assert_eq!(record.kind, NotificationKind::OrderExecuted);
        assert_eq!(record.status, NotificationStatus::Sent);
    }

    #[tokio::test]
    async fn test_batch_reports_each_item() {
        let service = service();
        let events = vec![
            OrderEvent::new("u1", "s1").user_email("a@example.com"),
            OrderEvent::default(),
            OrderEvent::new("u2", "s2"),
        ];

        let result = service.batch(events).await.unwrap();
        assert_eq!(result.summary.total, 3);
        assert_eq!(result.summary.succeeded, 2);
        assert_eq!(result.summary.failed, 1);

        assert_eq!(result.results[0].status, Some(NotificationStatus::Sent));
        assert!(!result.results[1].success);
        assert!(result.results[1].error.is_some());
        // No profile and no email: stored, but failed
        assert_eq!(result.results[2].status, Some(NotificationStatus::Failed));
    }

    #[tokio::test]
    async fn test_batch_size_limits() {
        let service = service();
        assert!(service.batch(vec![]).await.is_err());

        let too_many = vec![OrderEvent::new("u", "s"); MAX_BATCH_SIZE + 1];
        assert!(matches!(
            service.batch(too_many).await,
            Err(AppError::Validation(_))
        ));
    }
}
