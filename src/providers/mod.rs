//! Channel providers: adapters over third-party delivery APIs.
//!
//! Each channel has a single-capability trait. Implementations are built once
//! at start-up by [`ChannelProviders::from_settings`] and shared behind `Arc`.
//! A channel without credentials gets a logging provider so the service stays
//! usable in development.

mod logging;
mod push;
mod sms;
mod smtp;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Settings;
use crate::message::{EmailMessage, PushMessage};

pub use logging::{LogEmailProvider, LogPushProvider, LogSmsProvider};
pub use push::{FcmConfig, FcmPushProvider};
pub use sms::{TwilioConfig, TwilioSmsProvider};
pub use smtp::{SmtpConfig, SmtpEmailProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider configuration error: {0}")]
    Config(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, to: &str, message: &EmailMessage) -> ProviderResult<()>;

    fn name(&self) -> &'static str;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmsProvider: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> ProviderResult<()>;

    fn name(&self) -> &'static str;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Deliver to a single device token
    async fn send(&self, token: &str, message: &PushMessage) -> ProviderResult<()>;

    fn name(&self) -> &'static str;
}

/// The three channel providers the dispatch engine fans out to
#[derive(Clone)]
pub struct ChannelProviders {
    pub email: Arc<dyn EmailProvider>,
    pub sms: Arc<dyn SmsProvider>,
    pub push: Arc<dyn PushProvider>,
}

impl ChannelProviders {
    pub fn new(
        email: Arc<dyn EmailProvider>,
        sms: Arc<dyn SmsProvider>,
        push: Arc<dyn PushProvider>,
    ) -> Self {
        Self { email, sms, push }
    }

    /// Providers that only log what they would have sent.
    pub fn logging() -> Self {
        Self::new(
            Arc::new(LogEmailProvider),
            Arc::new(LogSmsProvider),
            Arc::new(LogPushProvider),
        )
    }

    /// Build real providers for every channel that has credentials configured.
    pub fn from_settings(settings: &Settings) -> ProviderResult<Self> {
        let timeout = std::time::Duration::from_secs(settings.providers.timeout_seconds);

        let email: Arc<dyn EmailProvider> = match SmtpConfig::from_settings(&settings.email) {
            Some(config) => Arc::new(SmtpEmailProvider::new(config, timeout)?),
            None => {
                tracing::warn!("SMTP host not configured, email notifications will only be logged");
                Arc::new(LogEmailProvider)
            }
        };

        let sms: Arc<dyn SmsProvider> = match TwilioConfig::from_settings(&settings.sms) {
            Some(config) => Arc::new(TwilioSmsProvider::new(config, timeout)?),
            None => {
                tracing::warn!("SMS credentials not configured, SMS notifications will only be logged");
                Arc::new(LogSmsProvider)
            }
        };

        let push: Arc<dyn PushProvider> = match FcmConfig::from_settings(&settings.push) {
            Some(config) => Arc::new(FcmPushProvider::new(config, timeout)?),
            None => {
                tracing::warn!("Push credentials not configured, push notifications will only be logged");
                Arc::new(LogPushProvider)
            }
        };

        tracing::info!(
            email = email.name(),
            sms = sms.name(),
            push = push.name(),
            "Channel providers initialized"
        );

        Ok(Self::new(email, sms, push))
    }
}

/// Keep only the last few characters of a destination for logs.
pub(crate) fn redact(destination: &str) -> String {
    let visible: String = destination
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("***{}", visible)
}
