//! Inbound trading event as published on the order event stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{NotificationKind, UnknownKind};

/// Event payload received from the broker or the internal send API.
///
/// Everything is optional on the wire; [`OrderEvent::user_id`] and
/// [`OrderEvent::subject_id`] report whether the required identifiers are
/// actually present. Unknown fields are preserved in `extra` so the stored
/// `details` keep the full payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, alias = "strategyId", skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub notification_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
    /// Numbers or numeric strings are both accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl OrderEvent {
    pub fn new(user_id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            subject_id: Some(subject_id.into()),
            ..Default::default()
        }
    }

    /// Parse a raw JSON payload.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    pub fn kind(mut self, kind: NotificationKind) -> Self {
        self.notification_type = Some(kind.as_str().to_string());
        self
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn side(mut self, side: impl Into<String>) -> Self {
        self.side = Some(side.into());
        self
    }

    pub fn price(mut self, price: f64) -> Self {
        self.price = Some(Value::from(price));
        self
    }

    pub fn quantity(mut self, quantity: f64) -> Self {
        self.quantity = Some(Value::from(quantity));
        self
    }

    pub fn user_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Owner of the notification, if present and non-blank
    pub fn user_id(&self) -> Option<&str> {
        non_blank(self.user_id.as_deref())
    }

    /// Originating subject, if present and non-blank
    pub fn subject_id(&self) -> Option<&str> {
        non_blank(self.subject_id.as_deref())
    }

    /// Resolve the notification kind, defaulting to `ORDER_EXECUTED` when absent.
    pub fn notification_kind(&self) -> Result<NotificationKind, UnknownKind> {
        match non_blank(self.notification_type.as_deref()) {
            Some(name) => name.parse(),
            None => Ok(NotificationKind::default()),
        }
    }

    /// Full payload as JSON, for the record's `details`.
    pub fn to_details(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Render an optional scalar the way it would read in a sentence.
///
/// Integral floats drop their fraction (`10.0` reads as `10`) and absent
/// values render as an empty string.
pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_original_payload() {
        let payload = r#"{
            "userId": "user-42",
            "strategyId": "strat-7",
            "notificationType": "STOP_LOSS",
            "symbol": "BTC/USDT",
            "price": 61250.5,
            "quantity": "0.25",
            "exchange": "binance"
        }"#;

        let event = OrderEvent::parse(payload).unwrap();
        assert_eq!(event.user_id(), Some("user-42"));
        assert_eq!(event.subject_id(), Some("strat-7"));
        assert_eq!(event.notification_kind(), Ok(NotificationKind::StopLoss));
        assert_eq!(event.extra.get("exchange"), Some(&json!("binance")));

        // Unknown fields survive into the stored details
        assert_eq!(event.to_details()["exchange"], "binance");
    }

    #[test]
    fn test_missing_type_defaults_to_order_executed() {
        let event = OrderEvent::new("u", "s");
        assert_eq!(event.notification_kind(), Ok(NotificationKind::OrderExecuted));
    }

    #[test]
    fn test_blank_identifiers_are_absent() {
        let event = OrderEvent::parse(r#"{"userId": "  ", "subjectId": ""}"#).unwrap();
        assert_eq!(event.user_id(), None);
        assert_eq!(event.subject_id(), None);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let event = OrderEvent::new("u", "s");
        let event = OrderEvent {
            notification_type: Some("MARGIN_CALL".to_string()),
            ..event
        };
        assert!(event.notification_kind().is_err());
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(None), "");
        assert_eq!(display_value(Some(&json!(150.25))), "150.25");
        assert_eq!(display_value(Some(&json!(10.0))), "10");
        assert_eq!(display_value(Some(&json!(3))), "3");
        assert_eq!(display_value(Some(&json!("0.5"))), "0.5");
    }
}
