//! Persistence for notification records and preference profiles.
//!
//! # Backends
//!
//! - `MemoryStore`: DashMap-backed, for development and tests (default)
//! - `PostgresStore`: sqlx over PostgreSQL
//!
//! Use [`create_stores`] to build the backend selected in configuration.

mod factory;
mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::notification::{NewNotification, NotificationKind, NotificationRecord, NotificationStatus};
use crate::preference::{PreferenceProfile, PreferenceUpdate};

pub use factory::{create_stores, Stores};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Optional listing filters. The date range only applies when both ends are set.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub kind: Option<NotificationKind>,
    pub status: Option<NotificationStatus>,
    pub is_read: Option<bool>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl RecordFilter {
    /// Inclusive created-at range, only when both bounds are present
    pub fn date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.created_from.zip(self.created_to)
    }

    pub fn matches(&self, record: &NotificationRecord) -> bool {
        if self.kind.is_some_and(|k| k != record.kind) {
            return false;
        }
        if self.status.is_some_and(|s| s != record.status) {
            return false;
        }
        if self.is_read.is_some_and(|r| r != record.is_read) {
            return false;
        }
        if let Some((from, to)) = self.date_range() {
            if record.created_at < from || record.created_at > to {
                return false;
            }
        }
        true
    }
}

/// 1-based page with a bounded page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Pagination {
    /// Clamp raw query values: page >= 1, limit in 1..=100, defaults 1 and 20.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }

    pub fn pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit as u64)
    }
}

/// One page of records plus the counts the listing reports.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<NotificationRecord>,
    /// Records matching the filter
    pub total: u64,
    /// Unread records of the user, ignoring the filter
    pub unread: u64,
}

/// Result of an insert-if-absent.
#[derive(Debug, Clone)]
pub struct ProfileInsert {
    /// The stored profile (the caller's, or the one that was already there)
    pub profile: PreferenceProfile,
    /// Whether this call created it
    pub created: bool,
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a new `Pending` record.
    async fn create_record(&self, new: NewNotification) -> StoreResult<NotificationRecord>;

    /// Set the status and refresh `updated_at`.
    async fn update_record_status(&self, id: Uuid, status: NotificationStatus) -> StoreResult<()>;

    /// Fetch a record owned by `user_id`.
    async fn get_record(&self, user_id: &str, id: Uuid) -> StoreResult<Option<NotificationRecord>>;

    /// Newest-first page of a user's records.
    async fn query_records(
        &self,
        user_id: &str,
        filter: &RecordFilter,
        pagination: Pagination,
    ) -> StoreResult<RecordPage>;

    /// Mark as read; `None` if the user owns no such record.
    async fn mark_read(&self, user_id: &str, id: Uuid) -> StoreResult<Option<NotificationRecord>>;

    /// Returns whether a record was removed.
    async fn delete_record(&self, user_id: &str, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<PreferenceProfile>>;

    /// Store `profile` unless the user already has one. Concurrent callers
    /// all observe the single stored profile.
    async fn insert_profile_if_absent(&self, profile: PreferenceProfile) -> StoreResult<ProfileInsert>;

    /// Merge `update` into the user's profile, creating a default one first
    /// if needed.
    async fn upsert_profile(
        &self,
        user_id: &str,
        update: &PreferenceUpdate,
    ) -> StoreResult<PreferenceProfile>;
}
