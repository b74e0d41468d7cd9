//! Channel-specific rendering of a stored notification record.

use std::collections::BTreeMap;
use std::sync::Arc;

use handlebars::{Handlebars, RenderError, TemplateError};
use serde::Serialize;

use crate::notification::{display_value, NotificationRecord};

/// Fully rendered email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Fully rendered push notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

pub const PUSH_CLICK_ACTION: &str = "FLUTTER_NOTIFICATION_CLICK";

/// Handlebars name of the HTML email layout
const EMAIL_HTML: &str = "email_html";

/// Values interpolated into the HTML email layout
#[derive(Debug, Serialize)]
struct EmailContext<'a> {
    heading: String,
    message: &'a str,
    subject_id: &'a str,
    time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    side: Option<String>,
    strategy_url: String,
}

impl<'a> EmailContext<'a> {
    fn new(record: &'a NotificationRecord, dashboard_url: &str) -> Self {
        let detail = |key: &str| {
            let value = display_value(record.details.get(key));
            (!value.is_empty()).then_some(value)
        };

        Self {
            heading: record.kind.as_str().replace('_', " "),
            message: &record.message,
            subject_id: &record.subject_id,
            time: record.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            symbol: detail("symbol"),
            price: detail("price"),
            quantity: detail("quantity"),
            side: detail("side"),
            strategy_url: format!(
                "{}/strategies/{}",
                dashboard_url.trim_end_matches('/'),
                record.subject_id
            ),
        }
    }
}

/// Template engine for channel content.
///
/// Layouts are registered once; interpolated values are HTML-escaped by
/// Handlebars.
#[derive(Clone)]
pub struct TemplateEngine {
    handlebars: Arc<Handlebars<'static>>,
}

impl TemplateEngine {
    pub fn new() -> Result<Self, TemplateError> {
        let mut handlebars = Handlebars::new();
        handlebars.register_template_string(EMAIL_HTML, EMAIL_HTML_TEMPLATE)?;

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    /// Render the email for `record`. `dashboard_url` is the base the
    /// "View Strategy" link is built from.
    pub fn email_message(
        &self,
        record: &NotificationRecord,
        dashboard_url: &str,
    ) -> Result<EmailMessage, RenderError> {
        tracing::debug!(notification_id = %record.id, "Rendering notification email");
        let html = self
            .handlebars
            .render(EMAIL_HTML, &EmailContext::new(record, dashboard_url))?;

        Ok(EmailMessage {
            subject: format!("Trading Notification: {}", record.kind),
            text: record.message.clone(),
            html,
        })
    }
}

pub fn push_message(record: &NotificationRecord) -> PushMessage {
    let mut data = BTreeMap::new();
    data.insert("notificationId".to_string(), record.id.to_string());
    data.insert("type".to_string(), record.kind.to_string());
    data.insert("strategyId".to_string(), record.subject_id.clone());
    data.insert("click_action".to_string(), PUSH_CLICK_ACTION.to_string());

    PushMessage {
        title: format!("Trading Alert: {}", record.kind),
        body: record.message.clone(),
        data,
    }
}

const EMAIL_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <style>
    body { font-family: Arial, sans-serif; margin: 0; padding: 0; color: #333; }
    .container { width: 100%; max-width: 600px; margin: 0 auto; padding: 20px; }
    .header { background-color: #2a2a72; color: white; padding: 15px; text-align: center; }
    .content { padding: 20px; background-color: #f9f9f9; }
    .footer { text-align: center; padding: 10px; font-size: 12px; color: #666; }
    .details { background-color: #fff; padding: 15px; margin-top: 20px; border-radius: 4px; border: 1px solid #ddd; }
    .button { display: inline-block; background-color: #2a2a72; color: white; padding: 10px 20px; text-decoration: none; border-radius: 4px; }
  </style>
</head>
<body>
  <div class="container">
    <div class="header">
      <h2>Trading Platform Notification</h2>
    </div>
    <div class="content">
      <h3>{{heading}}</h3>
      <p>{{message}}</p>
      <div class="details">
        <h4>Details:</h4>
        <p><strong>Strategy ID:</strong> {{subject_id}}</p>
        <p><strong>Time:</strong> {{time}}</p>
        {{#if symbol}}<p><strong>Symbol:</strong> {{symbol}}</p>{{/if}}
        {{#if price}}<p><strong>Price:</strong> {{price}}</p>{{/if}}
        {{#if quantity}}<p><strong>Quantity:</strong> {{quantity}}</p>{{/if}}
        {{#if side}}<p><strong>Side:</strong> {{side}}</p>{{/if}}
      </div>
      <p style="margin-top: 30px; text-align: center;">
        <a href="{{strategy_url}}" class="button">View Strategy</a>
      </p>
    </div>
    <div class="footer">
      <p>This is an automated message from your Trading Platform. Please do not reply to this email.</p>
      <p>To manage your notification preferences, visit your account settings.</p>
    </div>
  </div>
</body>
</html>
"#;
