//! Push provider for the Firebase Cloud Messaging HTTP v1 API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{redact, PushProvider, ProviderError, ProviderResult};
use crate::config::PushConfig;
use crate::message::PushMessage;

#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub api_base: String,
    pub project_id: String,
    /// OAuth2 bearer token for the service account
    pub access_token: String,
}

impl FcmConfig {
    pub fn from_settings(push: &PushConfig) -> Option<Self> {
        Some(Self {
            api_base: push.api_base.trim_end_matches('/').to_string(),
            project_id: push.project_id.clone().filter(|s| !s.is_empty())?,
            access_token: push.access_token.clone().filter(|s| !s.is_empty())?,
        })
    }

    fn send_url(&self) -> String {
        format!("{}/projects/{}/messages:send", self.api_base, self.project_id)
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Debug, Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: FcmNotification<'a>,
    data: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

pub struct FcmPushProvider {
    config: FcmConfig,
    client: Client,
}

impl FcmPushProvider {
    pub fn new(config: FcmConfig, timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { config, client })
    }
}

fn build_request<'a>(token: &'a str, message: &'a PushMessage) -> SendRequest<'a> {
    SendRequest {
        message: FcmMessage {
            token,
            notification: FcmNotification {
                title: &message.title,
                body: &message.body,
            },
            data: &message.data,
        },
    }
}

#[async_trait]
impl PushProvider for FcmPushProvider {
    async fn send(&self, token: &str, message: &PushMessage) -> ProviderResult<()> {
        let response = self
            .client
            .post(self.config.send_url())
            .bearer_auth(&self.config.access_token)
            .json(&build_request(token, message))
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

        tracing::debug!(token = %redact(token), "Push notification accepted");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fcm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), "STOP_LOSS".to_string());
        let message = PushMessage {
            title: "Trading Alert: STOP_LOSS".to_string(),
            body: "Stop loss triggered".to_string(),
            data,
        };

        let json = serde_json::to_value(build_request("tok-1", &message)).unwrap();
        assert_eq!(json["message"]["token"], "tok-1");
        assert_eq!(json["message"]["notification"]["title"], "Trading Alert: STOP_LOSS");
        assert_eq!(json["message"]["data"]["type"], "STOP_LOSS");
    }

    #[test]
    fn test_config_and_url() {
        let mut push = PushConfig::default();
        assert!(FcmConfig::from_settings(&push).is_none());

        push.project_id = Some("trading-app".to_string());
        push.access_token = Some("ya29.token".to_string());
        let config = FcmConfig::from_settings(&push).unwrap();
        assert_eq!(
            config.send_url(),
            "https://fcm.googleapis.com/v1/projects/trading-app/messages:send"
        );
    }
}
