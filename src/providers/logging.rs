//! Providers that record deliveries in the log instead of sending them.

use async_trait::async_trait;

use super::{redact, EmailProvider, ProviderResult, PushProvider, SmsProvider};
use crate::message::{EmailMessage, PushMessage};

pub struct LogEmailProvider;

#[async_trait]
impl EmailProvider for LogEmailProvider {
    async fn send(&self, to: &str, message: &EmailMessage) -> ProviderResult<()> {
        tracing::info!(
            to = %redact(to),
            subject = %message.subject,
            "Email notification (log provider)"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

pub struct LogSmsProvider;

#[async_trait]
impl SmsProvider for LogSmsProvider {
    async fn send(&self, to: &str, body: &str) -> ProviderResult<()> {
        tracing::info!(to = %redact(to), body = %body, "SMS notification (log provider)");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

pub struct LogPushProvider;

#[async_trait]
impl PushProvider for LogPushProvider {
    async fn send(&self, token: &str, message: &PushMessage) -> ProviderResult<()> {
        tracing::info!(
            token = %redact(token),
            title = %message.title,
            "Push notification (log provider)"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
