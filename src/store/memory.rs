//! In-memory store backed by DashMap.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::notification::{NewNotification, NotificationRecord, NotificationStatus};
use crate::preference::{PreferenceProfile, PreferenceUpdate};

use super::{
    NotificationStore, Pagination, PreferenceStore, ProfileInsert, RecordFilter, RecordPage,
    StoreError, StoreResult,
};

#[derive(Debug, Clone)]
struct StoredRecord {
    /// Insertion order, breaks ties between equal timestamps
    seq: u64,
    record: NotificationRecord,
}

/// Non-persistent store for development and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<Uuid, StoredRecord>,
    profiles: DashMap<String, PreferenceProfile>,
    next_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create_record(&self, new: NewNotification) -> StoreResult<NotificationRecord> {
        let record = new.into_record();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.records.insert(
            record.id,
            StoredRecord {
                seq,
                record: record.clone(),
            },
        );
        Ok(record)
    }

    async fn update_record_status(&self, id: Uuid, status: NotificationStatus) -> StoreResult<()> {
        let mut entry = self
            .records
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        entry.record.status = status;
        entry.record.updated_at = Utc::now();
        Ok(())
    }

    async fn get_record(&self, user_id: &str, id: Uuid) -> StoreResult<Option<NotificationRecord>> {
        Ok(self
            .records
            .get(&id)
            .filter(|e| e.record.user_id == user_id)
            .map(|e| e.record.clone()))
    }

    async fn query_records(
        &self,
        user_id: &str,
        filter: &RecordFilter,
        pagination: Pagination,
    ) -> StoreResult<RecordPage> {
        let mut unread = 0u64;
        let mut matching: Vec<StoredRecord> = Vec::new();

        for entry in self.records.iter() {
            let stored = entry.value();
            if stored.record.user_id != user_id {
                continue;
            }
            if !stored.record.is_read {
                unread += 1;
            }
            if filter.matches(&stored.record) {
                matching.push(stored.clone());
            }
        }

        matching.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        let total = matching.len() as u64;
        let records = matching
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit as usize)
            .map(|s| s.record)
            .collect();

        Ok(RecordPage {
            records,
            total,
            unread,
        })
    }

    async fn mark_read(&self, user_id: &str, id: Uuid) -> StoreResult<Option<NotificationRecord>> {
        match self.records.get_mut(&id) {
            Some(mut entry) if entry.record.user_id == user_id => {
                entry.record.is_read = true;
                entry.record.updated_at = Utc::now();
                Ok(Some(entry.record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_record(&self, user_id: &str, id: Uuid) -> StoreResult<bool> {
        Ok(self
            .records
            .remove_if(&id, |_, stored| stored.record.user_id == user_id)
            .is_some())
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<PreferenceProfile>> {
        Ok(self.profiles.get(user_id).map(|p| p.clone()))
    }

    async fn insert_profile_if_absent(&self, profile: PreferenceProfile) -> StoreResult<ProfileInsert> {
        match self.profiles.entry(profile.user_id.clone()) {
            Entry::Occupied(existing) => Ok(ProfileInsert {
                profile: existing.get().clone(),
                created: false,
            }),
            Entry::Vacant(slot) => {
                slot.insert(profile.clone());
                Ok(ProfileInsert {
                    profile,
                    created: true,
                })
            }
        }
    }

    async fn upsert_profile(
        &self,
        user_id: &str,
        update: &PreferenceUpdate,
    ) -> StoreResult<PreferenceProfile> {
        let mut entry = self
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(|| PreferenceProfile::default_for(user_id, None));
        update.apply_to(entry.value_mut());
        Ok(entry.value().clone())
    }
}
