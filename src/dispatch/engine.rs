use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::Instrument;

use handlebars::TemplateError;

use crate::message::{self, content, EmailMessage, PushMessage, TemplateEngine};
use crate::metrics::{DispatchMetrics, StoreMetrics};
use crate::notification::{
    Channel, NewNotification, NotificationRecord, NotificationStatus, OrderEvent,
};
use crate::preference::PreferenceProfile;
use crate::providers::{
    ChannelProviders, EmailProvider, ProviderResult, PushProvider,
};
use crate::store::{NotificationStore, PreferenceStore, StoreError, Stores};

use super::DispatchError;

/// Result of one channel's delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelOutcome {
    pub channel: Channel,
    pub success: bool,
}

/// Statistics for the dispatch engine
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Events that produced a record
    pub total_processed: AtomicU64,
    /// Records finished as `Sent` (including opt-outs)
    pub total_sent: AtomicU64,
    /// Records finished as `Failed`
    pub total_failed: AtomicU64,
    /// `Sent` records where the user had opted out of the kind
    pub total_opted_out: AtomicU64,
    /// Events rejected before a record was created
    pub total_invalid: AtomicU64,
    /// Default profiles created by this engine
    pub default_profiles_created: AtomicU64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            total_processed: self.total_processed.load(Ordering::Relaxed),
            total_sent: self.total_sent.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            total_opted_out: self.total_opted_out.load(Ordering::Relaxed),
            total_invalid: self.total_invalid.load(Ordering::Relaxed),
            default_profiles_created: self.default_profiles_created.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatch statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatchStatsSnapshot {
    pub total_processed: u64,
    pub total_sent: u64,
    pub total_failed: u64,
    pub total_opted_out: u64,
    pub total_invalid: u64,
    pub default_profiles_created: u64,
}

/// Consumes events, persists records, resolves preferences and fans out to
/// the channel providers.
pub struct DispatchEngine {
    notifications: Arc<dyn NotificationStore>,
    preferences: Arc<dyn PreferenceStore>,
    providers: ChannelProviders,
    templates: TemplateEngine,
    dashboard_url: String,
    stats: DispatchStats,
}

impl DispatchEngine {
    pub fn new(stores: Stores, providers: ChannelProviders) -> Result<Self, TemplateError> {
        Ok(Self {
            notifications: stores.notifications,
            preferences: stores.preferences,
            providers,
            templates: TemplateEngine::new()?,
            dashboard_url: crate::config::ContentConfig::default().dashboard_url,
            stats: DispatchStats::default(),
        })
    }

    /// Base URL for the "View Strategy" link in emails
    pub fn with_dashboard_url(mut self, url: impl Into<String>) -> Self {
        self.dashboard_url = url.into();
        self
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Process one event end to end.
    ///
    /// On success the returned record is `Sent` or `Failed`, never `Pending`.
    /// `InvalidEvent` means nothing was persisted; `Store` means the event
    /// should be redelivered.
    #[tracing::instrument(
        name = "dispatch.process_event",
        skip(self, event),
        fields(
            user_id = tracing::field::Empty,
            subject_id = tracing::field::Empty,
            kind = tracing::field::Empty,
            notification_id = tracing::field::Empty,
        )
    )]
    pub async fn process_event(&self, event: OrderEvent) -> Result<NotificationRecord, DispatchError> {
        let started = Instant::now();

        let new = match self.validate(&event) {
            Ok(new) => new,
            Err(e) => {
                self.stats.total_invalid.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let span = tracing::Span::current();
        span.record("user_id", new.user_id.as_str());
        span.record("subject_id", new.subject_id.as_str());
        span.record("kind", new.kind.as_str());

        tracing::info!("Processing notification event");

        let record = self
            .notifications
            .create_record(new)
            .await
            .map_err(store_error("create_record"))?;
        span.record("notification_id", tracing::field::display(record.id));
        self.stats.total_processed.fetch_add(1, Ordering::Relaxed);

        let profile = match self
            .preferences
            .get_profile(&record.user_id)
            .await
            .map_err(store_error("get_profile"))?
        {
            Some(profile) => profile,
            None => {
                let inserted = self
                    .preferences
                    .insert_profile_if_absent(PreferenceProfile::default_for(
                        &record.user_id,
                        event.user_email.as_deref(),
                    ))
                    .await
                    .map_err(store_error("insert_profile"))?;

                if inserted.created {
                    self.stats
                        .default_profiles_created
                        .fetch_add(1, Ordering::Relaxed);
                    DispatchMetrics::record_default_profile();
                    tracing::warn!("No notification preferences found, created default profile");

                    if inserted.profile.email_destination().is_none() {
                        tracing::warn!("No email address available for user");
                        return self
                            .finish(record, NotificationStatus::Failed, "no_address", started)
                            .await;
                    }
                }
                inserted.profile
            }
        };

        if !profile.is_opted_in(record.kind) {
            tracing::info!("User has disabled this notification type");
            self.stats.total_opted_out.fetch_add(1, Ordering::Relaxed);
            return self
                .finish(record, NotificationStatus::Sent, "opted_out", started)
                .await;
        }

        let outcomes = self.fan_out(&record, &profile).await;

        let (status, reason) = if outcomes.is_empty() {
            tracing::warn!("No enabled channel with a destination");
            (NotificationStatus::Failed, "no_channel")
        } else if outcomes.iter().any(|o| o.success) {
            (NotificationStatus::Sent, "delivered")
        } else {
            (NotificationStatus::Failed, "all_failed")
        };

        tracing::info!(
            attempted = outcomes.len(),
            succeeded = outcomes.iter().filter(|o| o.success).count(),
            "Channel fan-out finished"
        );

        self.finish(record, status, reason, started).await
    }

    fn validate(&self, event: &OrderEvent) -> Result<NewNotification, DispatchError> {
        let user_id = event
            .user_id()
            .ok_or_else(|| DispatchError::InvalidEvent("missing userId".to_string()))?;
        let subject_id = event
            .subject_id()
            .ok_or_else(|| DispatchError::InvalidEvent("missing subjectId".to_string()))?;
        let kind = event
            .notification_kind()
            .map_err(|e| DispatchError::InvalidEvent(e.to_string()))?;

        Ok(NewNotification {
            user_id: user_id.to_string(),
            subject_id: subject_id.to_string(),
            kind,
            message: message::generate(event),
            details: event.to_details(),
        })
    }

    /// Persist the final status.
    async fn finish(
        &self,
        mut record: NotificationRecord,
        status: NotificationStatus,
        reason: &'static str,
        started: Instant,
    ) -> Result<NotificationRecord, DispatchError> {
        match self.notifications.update_record_status(record.id, status).await {
            Ok(()) => {}
            // Deleted by its owner mid-dispatch
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(status = %status, "Record removed before its final status was stored");
            }
            Err(e) => return Err(store_error("update_status")(e)),
        }

        record.status = status;
        record.updated_at = Utc::now();

        match status {
            NotificationStatus::Failed => self.stats.total_failed.fetch_add(1, Ordering::Relaxed),
            _ => self.stats.total_sent.fetch_add(1, Ordering::Relaxed),
        };
        DispatchMetrics::record_outcome(status, reason, started.elapsed());

        tracing::info!(status = %status, reason = reason, "Notification dispatched");
        Ok(record)
    }

    /// Spawn one task per eligible channel and wait for all of them.
    /// A task that panics counts as a failed channel.
    async fn fan_out(
        &self,
        record: &NotificationRecord,
        profile: &PreferenceProfile,
    ) -> Vec<ChannelOutcome> {
        let mut outcomes = Vec::with_capacity(3);
        let mut tasks = Vec::with_capacity(3);

        if let Some(address) = profile.email_destination() {
            match self.templates.email_message(record, &self.dashboard_url) {
                Ok(email) => {
                    let provider = self.providers.email.clone();
                    let to = address.to_string();
                    tasks.push((
                        Channel::Email,
                        tokio::spawn(
                            timed(Channel::Email, async move { send_email(provider, to, email).await })
                                .instrument(tracing::info_span!("dispatch.channel", channel = "email")),
                        ),
                    ));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to render notification email");
                    DispatchMetrics::record_channel(Channel::Email, false, std::time::Duration::ZERO);
                    outcomes.push(ChannelOutcome {
                        channel: Channel::Email,
                        success: false,
                    });
                }
            }
        }

        if let Some(number) = profile.sms_destination() {
            let provider = self.providers.sms.clone();
            let to = number.to_string();
            let body = record.message.clone();
            tasks.push((
                Channel::Sms,
                tokio::spawn(
                    timed(Channel::Sms, async move { provider.send(&to, &body).await })
                        .instrument(tracing::info_span!("dispatch.channel", channel = "sms")),
                ),
            ));
        }

        if let Some(tokens) = profile.push_destinations() {
            let provider = self.providers.push.clone();
            let push = content::push_message(record);
            tasks.push((
                Channel::Push,
                tokio::spawn(
                    timed(Channel::Push, async move { send_push(provider, tokens, push).await })
                        .instrument(tracing::info_span!("dispatch.channel", channel = "push")),
                ),
            ));
        }

        let joined = join_all(
            tasks
                .into_iter()
                .map(|(channel, handle)| async move { (channel, handle.await) }),
        )
        .await;

        outcomes.extend(joined.into_iter().map(|(channel, result)| {
            let success = match result {
                Ok(success) => success,
                Err(e) => {
                    tracing::error!(channel = %channel, error = %e, "Channel task aborted");
                    DispatchMetrics::record_channel(channel, false, std::time::Duration::ZERO);
                    false
                }
            };
            ChannelOutcome { channel, success }
        }));
        outcomes
    }
}

fn store_error(operation: &'static str) -> impl FnOnce(StoreError) -> DispatchError {
    move |e| {
        StoreMetrics::record_error(operation);
        tracing::error!(operation = operation, error = %e, "Store operation failed");
        DispatchError::Store(e)
    }
}

/// Run a channel send, log and record its outcome, and reduce it to a bool.
async fn timed<F>(channel: Channel, send: F) -> bool
where
    F: std::future::Future<Output = ProviderResult<()>>,
{
    let started = Instant::now();
    let result = send.await;
    let success = result.is_ok();
    DispatchMetrics::record_channel(channel, success, started.elapsed());

    match result {
        Ok(()) => tracing::debug!(channel = %channel, "Channel delivery succeeded"),
        Err(e) => tracing::warn!(channel = %channel, error = %e, "Channel delivery failed"),
    }
    success
}

async fn send_email(
    provider: Arc<dyn EmailProvider>,
    to: String,
    email: EmailMessage,
) -> ProviderResult<()> {
    provider.send(&to, &email).await
}

/// Send to every device token concurrently; the channel succeeds only if
/// every token does.
async fn send_push(
    provider: Arc<dyn PushProvider>,
    tokens: Vec<String>,
    push: PushMessage,
) -> ProviderResult<()> {
    let results = join_all(tokens.iter().map(|token| provider.send(token, &push))).await;
    results.into_iter().collect::<ProviderResult<Vec<()>>>()?;
    tracing::debug!(devices = tokens.len(), "Push notifications sent");
    Ok(())
}
