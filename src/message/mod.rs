//! Human-readable notification content.
//!
//! [`generate`] produces the one-line message stored on every record and sent
//! over SMS. The [`content`] module layers channel-specific rendering (email
//! subject and HTML body, push title and data) on top of a stored record.

pub mod content;

use crate::notification::{display_value, NotificationKind, OrderEvent};

pub use content::{EmailMessage, PushMessage, TemplateEngine};

/// Map an event to its message text.
///
/// Never fails: absent fields render as empty strings and an absent or
/// unrecognised notification type falls back to a generic line built from
/// the symbol and free-form message.
pub fn generate(event: &OrderEvent) -> String {
    let symbol = event.symbol.as_deref().unwrap_or_default();
    let price = display_value(event.price.as_ref());

    let kind = event
        .notification_type
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .and_then(|name| name.parse::<NotificationKind>().ok());
    let Some(kind) = kind else {
        return format!(
            "Notification for {}: {}",
            symbol,
            event.message.as_deref().unwrap_or_default()
        );
    };

    match kind {
        NotificationKind::OrderExecuted => format!(
            "Order executed: {} {} {} at {}",
            event.side.as_deref().unwrap_or_default(),
            display_value(event.quantity.as_ref()),
            symbol,
            price
        ),
        NotificationKind::StopLoss => format!("Stop loss triggered for {} at {}", symbol, price),
        NotificationKind::TakeProfit => format!("Take profit reached for {} at {}", symbol, price),
        NotificationKind::StrategyStarted => "Strategy has been started".to_string(),
        NotificationKind::StrategyStopped => "Strategy has been stopped".to_string(),
        NotificationKind::Error => format!(
            "Error in strategy execution: {}",
            event
                .error_message
                .as_deref()
                .filter(|m| !m.is_empty())
                .unwrap_or("Unknown error")
        ),
    }
}
