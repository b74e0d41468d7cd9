use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of trading event a notification reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// An order was filled (default when the event names no type)
    #[default]
    OrderExecuted,
    StopLoss,
    TakeProfit,
    StrategyStarted,
    StrategyStopped,
    Error,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 6] = [
        NotificationKind::OrderExecuted,
        NotificationKind::StopLoss,
        NotificationKind::TakeProfit,
        NotificationKind::StrategyStarted,
        NotificationKind::StrategyStopped,
        NotificationKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderExecuted => "ORDER_EXECUTED",
            NotificationKind::StopLoss => "STOP_LOSS",
            NotificationKind::TakeProfit => "TAKE_PROFIT",
            NotificationKind::StrategyStarted => "STRATEGY_STARTED",
            NotificationKind::StrategyStopped => "STRATEGY_STOPPED",
            NotificationKind::Error => "ERROR",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known notification kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown notification type: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for NotificationKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Lifecycle state of a notification record.
///
/// A record is `Pending` only between creation and the end of its dispatch
/// attempt; afterwards it is always `Sent` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Sent => "SENT",
            NotificationStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, NotificationStatus::Pending)
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(NotificationStatus::Pending),
            "SENT" => Ok(NotificationStatus::Sent),
            "FAILED" => Ok(NotificationStatus::Failed),
            other => Err(format!("unknown notification status: {}", other)),
        }
    }
}

/// Delivery channel a notification can fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Push,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted notification entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: Uuid,
    pub user_id: String,
    /// Originating domain object (the strategy the event came from)
    pub subject_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    /// The event payload exactly as received
    pub details: serde_json::Value,
    pub status: NotificationStatus,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to create a notification record
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub subject_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub details: serde_json::Value,
}

impl NewNotification {
    /// Materialize a fresh `Pending`, unread record.
    pub fn into_record(self) -> NotificationRecord {
        let now = Utc::now();
        NotificationRecord {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            subject_id: self.subject_id,
            kind: self.kind,
            message: self.message,
            details: self.details,
            status: NotificationStatus::Pending,
            is_read: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&NotificationKind::StopLoss).unwrap(),
            "\"STOP_LOSS\""
        );
        let kind: NotificationKind = serde_json::from_str("\"STRATEGY_STARTED\"").unwrap();
        assert_eq!(kind, NotificationKind::StrategyStarted);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("TAKE_PROFIT".parse(), Ok(NotificationKind::TakeProfit));
        assert_eq!(
            "MARGIN_CALL".parse::<NotificationKind>(),
            Err(UnknownKind("MARGIN_CALL".to_string()))
        );
    }

    #[test]
    fn test_default_kind_is_order_executed() {
        assert_eq!(NotificationKind::default(), NotificationKind::OrderExecuted);
    }

    #[test]
    fn test_status_terminal() {
        assert!(!NotificationStatus::Pending.is_terminal());
        assert!(NotificationStatus::Sent.is_terminal());
        assert!(NotificationStatus::Failed.is_terminal());
        assert_eq!("FAILED".parse(), Ok(NotificationStatus::Failed));
    }

    #[test]
    fn test_new_notification_starts_pending_and_unread() {
        let record = NewNotification {
            user_id: "user-1".to_string(),
            subject_id: "strategy-1".to_string(),
            kind: NotificationKind::Error,
            message: "boom".to_string(),
            details: serde_json::json!({"userId": "user-1"}),
        }
        .into_record();

        assert_eq!(record.status, NotificationStatus::Pending);
        assert!(!record.is_read);
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = NewNotification {
            user_id: "user-1".to_string(),
            subject_id: "strategy-1".to_string(),
            kind: NotificationKind::OrderExecuted,
            message: "hi".to_string(),
            details: serde_json::Value::Null,
        }
        .into_record();

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["userId"], "user-1");
        assert_eq!(json["subjectId"], "strategy-1");
        assert_eq!(json["type"], "ORDER_EXECUTED");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["isRead"], false);
    }
}
