use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::notification::NotificationKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EmailSettings {
    pub enabled: bool,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SmsSettings {
    pub enabled: bool,
    #[serde(default)]
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PushSettings {
    pub enabled: bool,
    #[serde(default)]
    pub device_tokens: Vec<String>,
}

/// Per-user channel configuration and notification opt-ins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceProfile {
    pub user_id: String,
    pub email: EmailSettings,
    pub sms: SmsSettings,
    pub push: PushSettings,
    /// Kinds missing from the map count as opted in
    #[serde(default)]
    pub notification_types: BTreeMap<NotificationKind, bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PreferenceProfile {
    /// Profile synthesised for a user seen for the first time: email enabled
    /// with whatever address is known, every kind opted in, SMS and push off.
    pub fn default_for(user_id: impl Into<String>, email: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            email: EmailSettings {
                enabled: true,
                address: email.map(str::trim).unwrap_or_default().to_string(),
            },
            sms: SmsSettings::default(),
            push: PushSettings::default(),
            notification_types: NotificationKind::ALL
                .into_iter()
                .map(|kind| (kind, true))
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_opted_in(&self, kind: NotificationKind) -> bool {
        self.notification_types.get(&kind).copied().unwrap_or(true)
    }

    /// Email address if the channel is enabled and has somewhere to send
    pub fn email_destination(&self) -> Option<&str> {
        let address = self.email.address.trim();
        (self.email.enabled && !address.is_empty()).then_some(address)
    }

    pub fn sms_destination(&self) -> Option<&str> {
        let number = self.sms.phone_number.trim();
        (self.sms.enabled && !number.is_empty()).then_some(number)
    }

    /// Device tokens if push is enabled; empty tokens are ignored
    pub fn push_destinations(&self) -> Option<Vec<String>> {
        if !self.push.enabled {
            return None;
        }
        let tokens: Vec<String> = self
            .push
            .device_tokens
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        (!tokens.is_empty()).then_some(tokens)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSettingsUpdate {
    pub enabled: Option<bool>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsSettingsUpdate {
    pub enabled: Option<bool>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSettingsUpdate {
    pub enabled: Option<bool>,
    pub device_tokens: Option<Vec<String>>,
}

/// Partial profile update. Only the fields present change; notification
/// type flags are merged key by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceUpdate {
    pub email: Option<EmailSettingsUpdate>,
    pub sms: Option<SmsSettingsUpdate>,
    pub push: Option<PushSettingsUpdate>,
    pub notification_types: Option<BTreeMap<NotificationKind, bool>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreferenceError {
    #[error("Please enter a valid email address: {0}")]
    InvalidEmail(String),
}

impl PreferenceUpdate {
    pub fn validate(&self) -> Result<(), PreferenceError> {
        if let Some(address) = self.email.as_ref().and_then(|e| e.address.as_deref()) {
            let address = address.trim();
            if !address.is_empty() && !is_valid_email(address) {
                return Err(PreferenceError::InvalidEmail(address.to_string()));
            }
        }
        Ok(())
    }

    /// Merge this update into `profile`, refreshing `updated_at`.
    pub fn apply_to(&self, profile: &mut PreferenceProfile) {
        if let Some(email) = &self.email {
            if let Some(enabled) = email.enabled {
                profile.email.enabled = enabled;
            }
            if let Some(address) = &email.address {
                profile.email.address = address.trim().to_string();
            }
        }
        if let Some(sms) = &self.sms {
            if let Some(enabled) = sms.enabled {
                profile.sms.enabled = enabled;
            }
            if let Some(number) = &sms.phone_number {
                profile.sms.phone_number = number.trim().to_string();
            }
        }
        if let Some(push) = &self.push {
            if let Some(enabled) = push.enabled {
                profile.push.enabled = enabled;
            }
            if let Some(tokens) = &push.device_tokens {
                profile.push.device_tokens = tokens.clone();
            }
        }
        if let Some(types) = &self.notification_types {
            for (kind, enabled) in types {
                profile.notification_types.insert(*kind, *enabled);
            }
        }
        profile.updated_at = Utc::now();
    }
}

lazy_static! {
    static ref EMAIL_PATTERN: Regex = Regex::new(r"^\S+@\S+\.\S+$").unwrap();
}

/// `local@domain.tld` with no whitespace anywhere.
pub fn is_valid_email(address: &str) -> bool {
    EMAIL_PATTERN.is_match(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_shape() {
        let profile = PreferenceProfile::default_for("u1", None);
        assert_eq!(profile.user_id, "u1");
        assert!(profile.email.enabled);
        assert_eq!(profile.email.address, "");
        assert!(!profile.sms.enabled);
        assert!(!profile.push.enabled);
        for kind in NotificationKind::ALL {
            assert!(profile.is_opted_in(kind));
        }
        assert_eq!(profile.email_destination(), None);
        assert_eq!(profile.sms_destination(), None);
        assert_eq!(profile.push_destinations(), None);
    }

    #[test]
    fn test_default_profile_uses_event_email() {
        let profile = PreferenceProfile::default_for("u1", Some("trader@example.com"));
        assert_eq!(profile.email_destination(), Some("trader@example.com"));
    }

    #[test]
    fn test_missing_kind_counts_as_opted_in() {
        let mut profile = PreferenceProfile::default_for("u1", None);
        profile.notification_types.clear();
        assert!(profile.is_opted_in(NotificationKind::StopLoss));

        profile
            .notification_types
            .insert(NotificationKind::StopLoss, false);
        assert!(!profile.is_opted_in(NotificationKind::StopLoss));
    }

    #[test]
    fn test_destinations_require_enabled_and_data() {
        let mut profile = PreferenceProfile::default_for("u1", Some("a@b.co"));
        profile.email.enabled = false;
        assert_eq!(profile.email_destination(), None);

        profile.sms.phone_number = "+15551234567".to_string();
        assert_eq!(profile.sms_destination(), None);
        profile.sms.enabled = true;
        assert_eq!(profile.sms_destination(), Some("+15551234567"));

        profile.push.enabled = true;
        profile.push.device_tokens = vec!["".to_string(), " ".to_string()];
        assert_eq!(profile.push_destinations(), None);
        profile.push.device_tokens.push("tok-1".to_string());
        assert_eq!(profile.push_destinations(), Some(vec!["tok-1".to_string()]));
    }

    #[test]
    fn test_update_merges_only_provided_fields() {
        let mut profile = PreferenceProfile::default_for("u1", Some("user@example.com"));
        let update: PreferenceUpdate = serde_json::from_str(
            r#"{
                "email": {"enabled": false},
                "sms": {"enabled": true, "phoneNumber": "+15551234567"},
                "notificationTypes": {"STOP_LOSS": false}
            }"#,
        )
        .unwrap();

        update.validate().unwrap();
        update.apply_to(&mut profile);

        assert!(!profile.email.enabled);
        assert_eq!(profile.email.address, "user@example.com");
        assert!(profile.sms.enabled);
        assert_eq!(profile.sms.phone_number, "+15551234567");
        assert!(!profile.is_opted_in(NotificationKind::StopLoss));
        assert!(profile.is_opted_in(NotificationKind::TakeProfit));
    }

    #[test]
    fn test_update_rejects_invalid_email() {
        let update = PreferenceUpdate {
            email: Some(EmailSettingsUpdate {
                enabled: None,
                address: Some("not-an-email".to_string()),
            }),
            ..Default::default()
        };
        assert_eq!(
            update.validate(),
            Err(PreferenceError::InvalidEmail("not-an-email".to_string()))
        );
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.io"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user @example.com"));
        assert!(!is_valid_email("user@.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_email_validation_is_loose_about_trailing_dots() {
        assert!(is_valid_email("a@b.c."));
        assert!(is_valid_email("a@b.."));
        assert!(is_valid_email("first@last@example.com"));
    }
}
