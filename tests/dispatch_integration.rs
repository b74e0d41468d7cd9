//! End-to-end dispatch tests over the in-memory store
//!
//! Providers are recording fakes, so these tests run without SMTP, SMS,
//! push or broker access.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use trade_notification_service::consumer::{handle_entry, AckDecision, EventHandler};
use trade_notification_service::dispatch::DispatchEngine;
use trade_notification_service::message::{EmailMessage, PushMessage};
use trade_notification_service::notification::{
    NewNotification, NotificationKind, NotificationStatus, OrderEvent,
};
use trade_notification_service::preference::PreferenceUpdate;
use trade_notification_service::providers::{
    ChannelProviders, EmailProvider, ProviderError, ProviderResult, PushProvider, SmsProvider,
};
use trade_notification_service::store::{
    MemoryStore, NotificationStore, Pagination, PreferenceStore, RecordFilter, Stores,
};

/// Records every send and fails for destinations listed in `failing`
#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<String>>,
    failing: Vec<String>,
}

impl Recorder {
    fn failing(destinations: &[&str]) -> Self {
        Self {
            failing: destinations.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    fn record(&self, to: &str) -> ProviderResult<()> {
        self.sent.lock().unwrap().push(to.to_string());
        if self.failing.iter().any(|f| f == to) {
            Err(ProviderError::Transport(format!("{} unreachable", to)))
        } else {
            Ok(())
        }
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailProvider for Recorder {
    async fn send(&self, to: &str, _message: &EmailMessage) -> ProviderResult<()> {
        self.record(to)
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

#[async_trait]
impl SmsProvider for Recorder {
    async fn send(&self, to: &str, _body: &str) -> ProviderResult<()> {
        self.record(to)
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

#[async_trait]
impl PushProvider for Recorder {
    async fn send(&self, token: &str, _message: &PushMessage) -> ProviderResult<()> {
        self.record(token)
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

struct TestEnvironment {
    store: Arc<MemoryStore>,
    email: Arc<Recorder>,
    sms: Arc<Recorder>,
    push: Arc<Recorder>,
    engine: DispatchEngine,
}

fn create_test_environment_with(email: Recorder, sms: Recorder, push: Recorder) -> TestEnvironment {
    let store = Arc::new(MemoryStore::new());
    let email = Arc::new(email);
    let sms = Arc::new(sms);
    let push = Arc::new(push);

    let engine = DispatchEngine::new(
        Stores {
            notifications: store.clone(),
            preferences: store.clone(),
        },
        ChannelProviders::new(email.clone(), sms.clone(), push.clone()),
    )
    .unwrap();

    TestEnvironment {
        store,
        email,
        sms,
        push,
        engine,
    }
}

fn create_test_environment() -> TestEnvironment {
    create_test_environment_with(Recorder::default(), Recorder::default(), Recorder::default())
}

async fn set_preferences(store: &MemoryStore, user_id: &str, update: serde_json::Value) {
    let update: PreferenceUpdate = serde_json::from_value(update).unwrap();
    store.upsert_profile(user_id, &update).await.unwrap();
}

#[tokio::test]
async fn test_first_event_for_unknown_user_without_email() {
    let env = create_test_environment();

    let record = env
        .engine
        .process_event(OrderEvent::new("u1", "s1").kind(NotificationKind::OrderExecuted))
        .await
        .unwrap();
    assert_eq!(record.status, NotificationStatus::Failed);

    let page = env
        .store
        .query_records("u1", &RecordFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.records[0].status, NotificationStatus::Failed);

    let profile = env.store.get_profile("u1").await.unwrap().unwrap();
    assert!(profile.email.enabled);
    assert_eq!(profile.email.address, "");
    assert!(profile.is_opted_in(NotificationKind::OrderExecuted));

    assert!(env.email.sent().is_empty());
    assert!(env.sms.sent().is_empty());
    assert!(env.push.sent().is_empty());
}

#[tokio::test]
async fn test_sms_only_user_receives_stop_loss_by_sms() {
    let env = create_test_environment();
    set_preferences(
        &env.store,
        "u2",
        json!({
            "email": {"enabled": false},
            "sms": {"enabled": true, "phoneNumber": "+15551234567"},
            "push": {"enabled": false}
        }),
    )
    .await;

    let record = env
        .engine
        .process_event(
            OrderEvent::new("u2", "s1")
                .kind(NotificationKind::StopLoss)
                .symbol("ETH/USDT")
                .price(3150.0),
        )
        .await
        .unwrap();

    assert_eq!(record.status, NotificationStatus::Sent);
    assert_eq!(record.message, "Stop loss triggered for ETH/USDT at 3150");
    assert_eq!(env.sms.sent(), vec!["+15551234567".to_string()]);
    assert!(env.email.sent().is_empty());
    assert!(env.push.sent().is_empty());
}

#[tokio::test]
async fn test_partial_channel_failure_still_sent() {
    let env = create_test_environment_with(
        Recorder::failing(&["a@example.com"]),
        Recorder::default(),
        Recorder::default(),
    );
    set_preferences(
        &env.store,
        "u3",
        json!({
            "email": {"enabled": true, "address": "a@example.com"},
            "push": {"enabled": true, "deviceTokens": ["device-1"]}
        }),
    )
    .await;

    let record = env
        .engine
        .process_event(OrderEvent::new("u3", "s1").kind(NotificationKind::TakeProfit))
        .await
        .unwrap();

    assert_eq!(record.status, NotificationStatus::Sent);
    assert_eq!(env.email.sent().len(), 1);
    assert_eq!(env.push.sent(), vec!["device-1".to_string()]);
}

#[tokio::test]
async fn test_push_to_every_device() {
    let env = create_test_environment_with(
        Recorder::default(),
        Recorder::default(),
        Recorder::failing(&["stale-token"]),
    );
    set_preferences(
        &env.store,
        "u4",
        json!({
            "email": {"enabled": false},
            "push": {"enabled": true, "deviceTokens": ["phone", "stale-token", "tablet"]}
        }),
    )
    .await;

    let record = env
        .engine
        .process_event(OrderEvent::new("u4", "s1"))
        .await
        .unwrap();

    let mut sent = env.push.sent();
    sent.sort();
    assert_eq!(sent, vec!["phone", "stale-token", "tablet"]);
    assert_eq!(record.status, NotificationStatus::Failed);
}

#[tokio::test]
async fn test_opted_out_type_is_recorded_as_sent() {
    let env = create_test_environment();
    set_preferences(
        &env.store,
        "u5",
        json!({
            "email": {"enabled": true, "address": "u5@example.com"},
            "notificationTypes": {"STOP_LOSS": false}
        }),
    )
    .await;

    let record = env
        .engine
        .process_event(OrderEvent::new("u5", "s1").kind(NotificationKind::StopLoss))
        .await
        .unwrap();

    assert_eq!(record.status, NotificationStatus::Sent);
    assert!(env.email.sent().is_empty());

    // Other types still go out
    let record = env
        .engine
        .process_event(OrderEvent::new("u5", "s1").kind(NotificationKind::TakeProfit))
        .await
        .unwrap();
    assert_eq!(record.status, NotificationStatus::Sent);
    assert_eq!(env.email.sent(), vec!["u5@example.com".to_string()]);
}

#[tokio::test]
async fn test_error_event_message_and_details() {
    let env = create_test_environment();
    set_preferences(
        &env.store,
        "u6",
        json!({"email": {"enabled": true, "address": "u6@example.com"}}),
    )
    .await;

    let event = OrderEvent::parse(
        r#"{
            "userId": "u6",
            "strategyId": "grid-1",
            "notificationType": "ERROR",
            "errorMessage": "insufficient margin",
            "exchange": "binance"
        }"#,
    )
    .unwrap();

    let record = env.engine.process_event(event).await.unwrap();
    assert_eq!(record.subject_id, "grid-1");
    assert_eq!(record.message, "Error in strategy execution: insufficient margin");
    assert_eq!(record.details["exchange"], "binance");
}

#[tokio::test]
async fn test_listing_second_page() {
    let env = create_test_environment();

    for i in 0..10 {
        env.store
            .create_record(NewNotification {
                user_id: "lister".to_string(),
                subject_id: "s1".to_string(),
                kind: NotificationKind::OrderExecuted,
                message: format!("Test notification {}", i + 1),
                details: json!({}),
            })
            .await
            .unwrap();
    }

    let pagination = Pagination::new(Some(2), Some(3));
    let page = env
        .store
        .query_records("lister", &RecordFilter::default(), pagination)
        .await
        .unwrap();

    assert_eq!(page.records.len(), 3);
    assert_eq!(page.total, 10);
    assert_eq!(page.unread, 10);
    assert_eq!(pagination.pages(page.total), 4);
    // Newest first: page 2 holds the 7th, 6th and 5th records created
    assert_eq!(page.records[0].message, "Test notification 7");
    assert_eq!(page.records[2].message, "Test notification 5");
}

#[tokio::test]
async fn test_concurrent_first_events_create_one_profile() {
    let env = Arc::new(create_test_environment());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let env = env.clone();
            tokio::spawn(async move {
                env.engine
                    .process_event(
                        OrderEvent::new("racer", format!("s{}", i)).user_email("racer@example.com"),
                    )
                    .await
            })
        })
        .collect();

    for handle in handles {
        let record = handle.await.unwrap().unwrap();
        assert_eq!(record.status, NotificationStatus::Sent);
    }

    assert_eq!(env.store.profile_count(), 1);
    assert_eq!(env.store.record_count(), 8);
    assert_eq!(env.engine.stats().default_profiles_created, 1);
}

#[tokio::test]
async fn test_consumer_decisions_over_engine() {
    let env = create_test_environment();
    let handler: &dyn EventHandler = &env.engine;

    let decision = handle_entry(
        handler,
        "order.completed",
        Some("order.completed"),
        Some(r#"{"userId": "c1", "strategyId": "s1"}"#),
    )
    .await;
    assert_eq!(decision, AckDecision::Ack);

    let decision = handle_entry(handler, "order.completed", None, Some("{broken")).await;
    assert_eq!(decision, AckDecision::Discard);

    let decision = handle_entry(
        handler,
        "order.completed",
        Some("order.cancelled"),
        Some(r#"{"userId": "c1", "strategyId": "s2"}"#),
    )
    .await;
    assert_eq!(decision, AckDecision::Ack);

    // Only the first entry produced a record
    assert_eq!(env.store.record_count(), 1);
}
