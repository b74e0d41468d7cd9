//! SMTP email provider using lettre.

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{redact, EmailProvider, ProviderError, ProviderResult};
use crate::config::EmailConfig;
use crate::message::EmailMessage;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from_email: String,
    pub from_name: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Implicit TLS relay; plain (local relay) otherwise
    pub use_tls: bool,
}

impl SmtpConfig {
    /// `None` when no SMTP host is configured.
    pub fn from_settings(email: &EmailConfig) -> Option<Self> {
        let host = email.smtp_host.as_deref().map(str::trim).filter(|h| !h.is_empty())?;
        Some(Self {
            host: host.to_string(),
            port: email.smtp_port,
            from_email: email.from_email.clone(),
            from_name: email.from_name.clone(),
            username: email.username.clone(),
            password: email.password.clone(),
            use_tls: email.use_tls,
        })
    }
}

pub struct SmtpEmailProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailProvider {
    pub fn new(config: SmtpConfig, timeout: Duration) -> ProviderResult<Self> {
        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .map_err(|e| ProviderError::Config(format!("Invalid from address: {}", e)))?;

        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Some(Credentials::new(user.clone(), pass.clone())),
            _ => None,
        };

        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| ProviderError::Config(format!("Failed to create SMTP relay: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        builder = builder.port(config.port).timeout(Some(timeout));
        if let Some(credentials) = credentials {
            builder = builder.credentials(credentials);
        }

        tracing::info!(
            host = %config.host,
            port = config.port,
            tls = config.use_tls,
            "SMTP email provider configured"
        );

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, to: &str, message: &EmailMessage) -> ProviderResult<Message> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| ProviderError::InvalidDestination(format!("{}: {}", redact(to), e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(message.html.clone()),
                    ),
            )
            .map_err(|e| ProviderError::Transport(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailProvider {
    async fn send(&self, to: &str, message: &EmailMessage) -> ProviderResult<()> {
        let email = self.build_message(to, message)?;

        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        tracing::debug!(
            to = %redact(to),
            code = %response.code(),
            "Email accepted by SMTP relay"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SmtpConfig {
        SmtpConfig {
            host: "localhost".to_string(),
            port: 1025,
            from_email: "noreply@example.com".to_string(),
            from_name: "Trading Platform".to_string(),
            username: None,
            password: None,
            use_tls: false,
        }
    }

    #[test]
    fn test_config_requires_host() {
        let mut email = EmailConfig::default();
        assert!(SmtpConfig::from_settings(&email).is_none());

        email.smtp_host = Some("smtp.example.com".to_string());
        let config = SmtpConfig::from_settings(&email).unwrap();
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 587);
    }

    #[tokio::test]
    async fn test_build_message_rejects_bad_recipient() {
        let provider = SmtpEmailProvider::new(test_config(), Duration::from_secs(1)).unwrap();
        let message = EmailMessage {
            subject: "s".to_string(),
            text: "t".to_string(),
            html: "<p>t</p>".to_string(),
        };

        assert!(provider.build_message("trader@example.com", &message).is_ok());
        assert!(matches!(
            provider.build_message("not an address", &message),
            Err(ProviderError::InvalidDestination(_))
        ));
    }
}
