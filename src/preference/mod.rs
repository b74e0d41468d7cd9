//! User notification preferences.

mod types;

pub use types::{
    is_valid_email, EmailSettings, EmailSettingsUpdate, PreferenceError, PreferenceProfile,
    PreferenceUpdate, PushSettings, PushSettingsUpdate, SmsSettings, SmsSettingsUpdate,
};
