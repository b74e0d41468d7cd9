//! PostgreSQL-backed store.
//!
//! Tables:
//! - `notifications` - one row per notification record, event payload as JSONB
//! - `user_preferences` - one row per user, channel settings as JSONB columns

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::notification::{NewNotification, NotificationKind, NotificationRecord, NotificationStatus};
use crate::preference::{EmailSettings, PreferenceProfile, PreferenceUpdate, PushSettings, SmsSettings};

use super::{
    NotificationStore, Pagination, PreferenceStore, ProfileInsert, RecordFilter, RecordPage,
    StoreError, StoreResult,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id UUID PRIMARY KEY,
        user_id TEXT NOT NULL,
        subject_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        message TEXT NOT NULL,
        details JSONB NOT NULL DEFAULT '{}'::jsonb,
        status TEXT NOT NULL,
        is_read BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_notifications_user_created ON notifications (user_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_user_unread ON notifications (user_id) WHERE NOT is_read",
    r#"
    CREATE TABLE IF NOT EXISTS user_preferences (
        user_id TEXT PRIMARY KEY,
        email JSONB NOT NULL,
        sms JSONB NOT NULL,
        push JSONB NOT NULL,
        notification_types JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

const RECORD_COLUMNS: &str =
    "id, user_id, subject_id, kind, message, details, status, is_read, created_at, updated_at";

const PROFILE_COLUMNS: &str =
    "user_id, email, sms, push, notification_types, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: String,
    subject_id: String,
    kind: String,
    message: String,
    details: serde_json::Value,
    status: String,
    is_read: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for NotificationRecord {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(NotificationRecord {
            id: row.id,
            user_id: row.user_id,
            subject_id: row.subject_id,
            kind: row
                .kind
                .parse::<NotificationKind>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            message: row.message,
            details: row.details,
            status: row
                .status
                .parse::<NotificationStatus>()
                .map_err(StoreError::Corrupt)?,
            is_read: row.is_read,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: String,
    email: Json<EmailSettings>,
    sms: Json<SmsSettings>,
    push: Json<PushSettings>,
    notification_types: Json<BTreeMap<NotificationKind, bool>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for PreferenceProfile {
    fn from(row: ProfileRow) -> Self {
        PreferenceProfile {
            user_id: row.user_id,
            email: row.email.0,
            sms: row.sms.0,
            push: row.push.0,
            notification_types: row.notification_types.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("PostgreSQL notification schema ready");
        Ok(())
    }

    async fn fetch_profile(&self, user_id: &str) -> StoreResult<Option<PreferenceProfile>> {
        let row: Option<ProfileRow> = sqlx::query_as(&format!(
            "SELECT {} FROM user_preferences WHERE user_id = $1",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PreferenceProfile::from))
    }
}

/// Append the WHERE clause shared by the page and count queries.
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, user_id: &str, filter: &RecordFilter) {
    builder.push(" WHERE user_id = ").push_bind(user_id.to_string());

    if let Some(kind) = filter.kind {
        builder.push(" AND kind = ").push_bind(kind.as_str());
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(is_read) = filter.is_read {
        builder.push(" AND is_read = ").push_bind(is_read);
    }
    if let Some((from, to)) = filter.date_range() {
        builder
            .push(" AND created_at >= ")
            .push_bind(from)
            .push(" AND created_at <= ")
            .push_bind(to);
    }
}

#[async_trait]
impl NotificationStore for PostgresStore {
    async fn create_record(&self, new: NewNotification) -> StoreResult<NotificationRecord> {
        let record = new.into_record();

        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, user_id, subject_id, kind, message, details, status, is_read, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.subject_id)
        .bind(record.kind.as_str())
        .bind(&record.message)
        .bind(&record.details)
        .bind(record.status.as_str())
        .bind(record.is_read)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update_record_status(&self, id: Uuid, status: NotificationStatus) -> StoreResult<()> {
        let result = sqlx::query("UPDATE notifications SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn get_record(&self, user_id: &str, id: Uuid) -> StoreResult<Option<NotificationRecord>> {
        let row: Option<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notifications WHERE id = $1 AND user_id = $2",
            RECORD_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(NotificationRecord::try_from).transpose()
    }

    async fn query_records(
        &self,
        user_id: &str,
        filter: &RecordFilter,
        pagination: Pagination,
    ) -> StoreResult<RecordPage> {
        let mut page_query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM notifications",
            RECORD_COLUMNS
        ));
        push_filters(&mut page_query, user_id, filter);
        page_query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(pagination.limit as i64)
            .push(" OFFSET ")
            .push_bind(pagination.offset() as i64);

        let rows: Vec<NotificationRow> = page_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notifications");
        push_filters(&mut count_query, user_id, filter);
        let (total,): (i64,) = count_query.build_query_as().fetch_one(&self.pool).await?;

        let (unread,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let records = rows
            .into_iter()
            .map(NotificationRecord::try_from)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(RecordPage {
            records,
            total: total.max(0) as u64,
            unread: unread.max(0) as u64,
        })
    }

    async fn mark_read(&self, user_id: &str, id: Uuid) -> StoreResult<Option<NotificationRecord>> {
        let row: Option<NotificationRow> = sqlx::query_as(&format!(
            "UPDATE notifications SET is_read = TRUE, updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 RETURNING {}",
            RECORD_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(NotificationRecord::try_from).transpose()
    }

    async fn delete_record(&self, user_id: &str, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PreferenceStore for PostgresStore {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<PreferenceProfile>> {
        self.fetch_profile(user_id).await
    }

    async fn insert_profile_if_absent(&self, profile: PreferenceProfile) -> StoreResult<ProfileInsert> {
        let inserted: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO user_preferences
                (user_id, email, sms, push, notification_types, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO NOTHING
            RETURNING user_id
            "#,
        )
        .bind(&profile.user_id)
        .bind(Json(&profile.email))
        .bind(Json(&profile.sms))
        .bind(Json(&profile.push))
        .bind(Json(&profile.notification_types))
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_some() {
            return Ok(ProfileInsert {
                profile,
                created: true,
            });
        }

        // Lost the race: whoever inserted first wins
        let existing = self
            .fetch_profile(&profile.user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(profile.user_id.clone()))?;

        Ok(ProfileInsert {
            profile: existing,
            created: false,
        })
    }

    async fn upsert_profile(
        &self,
        user_id: &str,
        update: &PreferenceUpdate,
    ) -> StoreResult<PreferenceProfile> {
        self.insert_profile_if_absent(PreferenceProfile::default_for(user_id, None))
            .await?;

        let mut tx = self.pool.begin().await?;

        let row: ProfileRow = sqlx::query_as(&format!(
            "SELECT {} FROM user_preferences WHERE user_id = $1 FOR UPDATE",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut profile = PreferenceProfile::from(row);
        update.apply_to(&mut profile);

        sqlx::query(
            r#"
            UPDATE user_preferences
            SET email = $2, sms = $3, push = $4, notification_types = $5, updated_at = $6
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(Json(&profile.email))
        .bind(Json(&profile.sms))
        .bind(Json(&profile.push))
        .bind(Json(&profile.notification_types))
        .bind(profile.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(user_id = %user_id, "Preference profile updated");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: &str, status: &str) -> NotificationRow {
        NotificationRow {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            subject_id: "s1".to_string(),
            kind: kind.to_string(),
            message: "m".to_string(),
            details: serde_json::json!({}),
            status: status.to_string(),
            is_read: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_conversion() {
        let record = NotificationRecord::try_from(row("STOP_LOSS", "SENT")).unwrap();
        assert_eq!(record.kind, NotificationKind::StopLoss);
        assert_eq!(record.status, NotificationStatus::Sent);
    }

    #[test]
    fn test_row_conversion_rejects_unknown_values() {
        assert!(matches!(
            NotificationRecord::try_from(row("MARGIN_CALL", "SENT")),
            Err(StoreError::Corrupt(_))
        ));
        assert!(matches!(
            NotificationRecord::try_from(row("ERROR", "QUEUED")),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_filters_build_expected_sql() {
        let filter = RecordFilter {
            kind: Some(NotificationKind::Error),
            is_read: Some(false),
            created_from: Some(Utc::now()),
            created_to: None,
            ..Default::default()
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notifications");
        push_filters(&mut builder, "u1", &filter);

        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND kind = $2 AND is_read = $3"
        );
    }
}
