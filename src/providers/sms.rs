//! SMS provider for Twilio's Messages REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{redact, ProviderError, ProviderResult, SmsProvider};
use crate::config::SmsConfig;

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub api_base: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

impl TwilioConfig {
    /// `None` unless account sid, auth token and sender number are all set.
    pub fn from_settings(sms: &SmsConfig) -> Option<Self> {
        Some(Self {
            api_base: sms.api_base.trim_end_matches('/').to_string(),
            account_sid: sms.account_sid.clone().filter(|s| !s.is_empty())?,
            auth_token: sms.auth_token.clone().filter(|s| !s.is_empty())?,
            from_number: sms.from_number.clone().filter(|s| !s.is_empty())?,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/Accounts/{}/Messages.json", self.api_base, self.account_sid)
    }
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: Option<String>,
}

pub struct TwilioSmsProvider {
    config: TwilioConfig,
    client: Client,
}

impl TwilioSmsProvider {
    pub fn new(config: TwilioConfig, timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl SmsProvider for TwilioSmsProvider {
    async fn send(&self, to: &str, body: &str) -> ProviderResult<()> {
        let params = [
            ("To", to),
            ("From", self.config.from_number.as_str()),
            ("Body", body),
        ];

        let response = self
            .client
            .post(self.config.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let sid = response
            .json::<MessageResponse>()
            .await
            .ok()
            .and_then(|r| r.sid)
            .unwrap_or_default();
        tracing::debug!(to = %redact(to), sid = %sid, "SMS accepted");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "twilio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_requires_all_credentials() {
        let mut sms = SmsConfig::default();
        assert!(TwilioConfig::from_settings(&sms).is_none());

        sms.account_sid = Some("AC123".to_string());
        sms.auth_token = Some("token".to_string());
        assert!(TwilioConfig::from_settings(&sms).is_none());

        sms.from_number = Some("+15105550000".to_string());
        let config = TwilioConfig::from_settings(&sms).unwrap();
        assert_eq!(
            config.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }
}
