// Typed accessors over persisted push settings.
//
// Every persisted field lives under one of the string keys in `keys`. The
// backing `KeyValueStore` serializes its own writers; `PushSettings` only
// adds typing and defaults on top. Storage failures are logged and reads fall
// back to the default value, so a broken store degrades to first-launch
// behaviour instead of failing platform callbacks.

use std::str::FromStr;
use std::sync::Arc;

use chrono_tz::Tz;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::platform::AuthorizationSnapshot;
use super::quiet_time::{QuietTimeWindow, TimeOfDay, TimeZoneRef};
use super::registration::RegistrationPayload;
use super::{DeviceToken, PushResult};

/// Persisted setting keys
pub mod keys {
    pub const USER_PUSH_ENABLED: &str = "user-push-enabled";
    pub const BACKGROUND_PUSH_ENABLED: &str = "background-push-enabled";
    pub const EXTENDED_PERMISSION_ENABLED: &str = "extended-permission-enabled";
    /// Tags stored before tags moved to the channel. Only read by the migrator.
    pub const LEGACY_TAGS: &str = "legacy-tags";
    pub const BADGE: &str = "badge";
    pub const QUIET_TIME_SETTINGS: &str = "quiet-time-settings";
    pub const QUIET_TIME_ENABLED: &str = "quiet-time-enabled";
    pub const QUIET_TIME_TIMEZONE: &str = "quiet-time-timezone";
    /// Field of the quiet time settings object
    pub const QUIET_TIME_START: &str = "quiet-time-start";
    /// Field of the quiet time settings object
    pub const QUIET_TIME_END: &str = "quiet-time-end";
    pub const TAGS_MIGRATED: &str = "tags-migrated-flag";

    pub const AUTHORIZATION_STATUS: &str = "authorization-status";
    pub const AUTHORIZED_SETTINGS: &str = "authorized-settings";
    pub const USER_PROMPTED: &str = "user-prompted-for-notifications";
    pub const DEVICE_TOKEN: &str = "device-token";
    pub const LAST_REGISTRATION_PAYLOAD: &str = "last-registration-payload";
}

/// Persisted key/value storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> PushResult<()>;
    fn remove(&self, key: &str) -> PushResult<()>;
}

/// Typed push settings over a shared store
#[derive(Clone)]
pub struct PushSettings {
    store: Arc<dyn KeyValueStore>,
    user_push_enabled_default: bool,
    background_push_enabled_default: bool,
}

impl PushSettings {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            user_push_enabled_default: false,
            background_push_enabled_default: true,
        }
    }

    pub fn with_defaults(mut self, user_push_enabled: bool, background_push_enabled: bool) -> Self {
        self.user_push_enabled_default = user_push_enabled;
        self.background_push_enabled_default = background_push_enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.store.get(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring undecodable setting");
                None
            },
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) {
        let encoded = match serde_json::to_value(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(key, error = %e, "Failed to encode setting");
                return;
            },
        };
        if let Err(e) = self.store.set(key, encoded) {
            tracing::error!(key, error = %e, "Failed to persist setting");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            tracing::error!(key, error = %e, "Failed to remove setting");
        }
    }

    pub fn user_push_enabled(&self) -> bool {
        self.read(keys::USER_PUSH_ENABLED)
            .unwrap_or(self.user_push_enabled_default)
    }

    pub fn set_user_push_enabled(&self, enabled: bool) {
        self.write(keys::USER_PUSH_ENABLED, &enabled);
    }

    pub fn background_push_enabled(&self) -> bool {
        self.read(keys::BACKGROUND_PUSH_ENABLED)
            .unwrap_or(self.background_push_enabled_default)
    }

    pub fn set_background_push_enabled(&self, enabled: bool) {
        self.write(keys::BACKGROUND_PUSH_ENABLED, &enabled);
    }

    pub fn extended_permission_enabled(&self) -> bool {
        self.read(keys::EXTENDED_PERMISSION_ENABLED).unwrap_or(false)
    }

    pub fn set_extended_permission_enabled(&self, enabled: bool) {
        self.write(keys::EXTENDED_PERMISSION_ENABLED, &enabled);
    }

    pub fn legacy_tags(&self) -> Vec<String> {
        self.read(keys::LEGACY_TAGS).unwrap_or_default()
    }

    pub fn set_legacy_tags(&self, tags: &[String]) {
        self.write(keys::LEGACY_TAGS, &tags);
    }

    pub fn remove_legacy_tags(&self) {
        self.remove(keys::LEGACY_TAGS);
    }

    pub fn badge(&self) -> i64 {
        self.read(keys::BADGE).unwrap_or(0)
    }

    pub fn set_badge(&self, badge: i64) {
        self.write(keys::BADGE, &badge);
    }

    pub fn quiet_time_enabled(&self) -> bool {
        self.read(keys::QUIET_TIME_ENABLED).unwrap_or(false)
    }

    pub fn set_quiet_time_enabled(&self, enabled: bool) {
        self.write(keys::QUIET_TIME_ENABLED, &enabled);
    }

    /// Configured quiet time zone. `None` means the device local zone.
    pub fn time_zone(&self) -> Option<Tz> {
        let name: String = self.read(keys::QUIET_TIME_TIMEZONE)?;
        match Tz::from_str(&name) {
            Ok(tz) => Some(tz),
            Err(e) => {
                tracing::warn!(time_zone = %name, error = %e, "Unknown quiet time zone");
                None
            },
        }
    }

    pub fn set_time_zone(&self, time_zone: Option<Tz>) {
        match time_zone {
            Some(tz) => self.write(keys::QUIET_TIME_TIMEZONE, &tz.name()),
            None => self.remove(keys::QUIET_TIME_TIMEZONE),
        }
    }

    pub fn set_quiet_time(&self, start: TimeOfDay, end: TimeOfDay) {
        let mut settings = Map::new();
        settings.insert(keys::QUIET_TIME_START.to_string(), Value::from(start.to_string()));
        settings.insert(keys::QUIET_TIME_END.to_string(), Value::from(end.to_string()));
        self.write(keys::QUIET_TIME_SETTINGS, &settings);
    }

    /// Quiet time window, if start and end were ever set
    pub fn quiet_time(&self) -> Option<QuietTimeWindow> {
        let settings: Value = self.read(keys::QUIET_TIME_SETTINGS)?;
        let start = settings.get(keys::QUIET_TIME_START)?.as_str()?;
        let end = settings.get(keys::QUIET_TIME_END)?.as_str()?;

        let (start, end) = match (TimeOfDay::parse(start), TimeOfDay::parse(end)) {
            (Ok(start), Ok(end)) => (start, end),
            _ => {
                tracing::warn!("Ignoring malformed quiet time settings");
                return None;
            },
        };

        Some(QuietTimeWindow {
            enabled: self.quiet_time_enabled(),
            start,
            end,
            time_zone: TimeZoneRef::from_option(self.time_zone()),
        })
    }

    pub fn tags_migrated(&self) -> bool {
        self.read(keys::TAGS_MIGRATED).unwrap_or(false)
    }

    pub fn set_tags_migrated(&self, migrated: bool) {
        self.write(keys::TAGS_MIGRATED, &migrated);
    }

    pub fn authorization_snapshot(&self) -> AuthorizationSnapshot {
        AuthorizationSnapshot {
            status: self.read(keys::AUTHORIZATION_STATUS).unwrap_or_default(),
            granted_settings: self.read(keys::AUTHORIZED_SETTINGS).unwrap_or_default(),
            prompted_before: self.read(keys::USER_PROMPTED).unwrap_or(false),
        }
    }

    pub fn set_authorization_snapshot(&self, snapshot: &AuthorizationSnapshot) {
        self.write(keys::AUTHORIZATION_STATUS, &snapshot.status);
        self.write(keys::AUTHORIZED_SETTINGS, &snapshot.granted_settings);
        self.write(keys::USER_PROMPTED, &snapshot.prompted_before);
    }

    pub fn device_token(&self) -> Option<DeviceToken> {
        self.read(keys::DEVICE_TOKEN)
    }

    pub fn set_device_token(&self, token: Option<&DeviceToken>) {
        match token {
            Some(token) => self.write(keys::DEVICE_TOKEN, token),
            None => self.remove(keys::DEVICE_TOKEN),
        }
    }

    /// Payload of the last successful registration
    pub fn last_registration_payload(&self) -> Option<RegistrationPayload> {
        self.read(keys::LAST_REGISTRATION_PAYLOAD)
    }

    pub fn set_last_registration_payload(&self, payload: &RegistrationPayload) {
        self.write(keys::LAST_REGISTRATION_PAYLOAD, payload);
    }
}

impl std::fmt::Debug for PushSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushSettings")
            .field("user_push_enabled_default", &self.user_push_enabled_default)
            .field(
                "background_push_enabled_default",
                &self.background_push_enabled_default,
            )
            .finish_non_exhaustive()
    }
}
