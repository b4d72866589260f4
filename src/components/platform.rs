// Notification platform integration: authorization state reported by the OS
// and the collaborator interfaces the registration core talks to

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::registration::RegistrationPayload;
use super::{PushFuture, PushResult};

/// Authorization status reported by the notification platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    /// User has not been prompted yet
    #[default]
    NotDetermined,
    /// User declined notifications
    Denied,
    /// User granted notifications
    Authorized,
    /// Quiet delivery without an explicit prompt
    Provisional,
    /// Temporary authorization (App Clips)
    Ephemeral,
}

impl AuthorizationStatus {
    pub fn is_authorized(&self) -> bool {
        matches!(
            self,
            AuthorizationStatus::Authorized
                | AuthorizationStatus::Provisional
                | AuthorizationStatus::Ephemeral
        )
    }

    /// Whether showing the permission prompt can still change anything
    pub fn can_request(&self, extended_permission_enabled: bool) -> bool {
        match self {
            AuthorizationStatus::NotDetermined => true,
            AuthorizationStatus::Ephemeral => extended_permission_enabled,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthorizationStatus::NotDetermined => "not_determined",
            AuthorizationStatus::Denied => "denied",
            AuthorizationStatus::Authorized => "authorized",
            AuthorizationStatus::Provisional => "provisional",
            AuthorizationStatus::Ephemeral => "ephemeral",
        }
    }
}

bitflags! {
    /// Notification settings currently enabled for the app in system settings
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct AuthorizedSettings: u32 {
        const BADGE = 1 << 0;
        const SOUND = 1 << 1;
        const ALERT = 1 << 2;
        const CAR_PLAY = 1 << 3;
        const LOCK_SCREEN = 1 << 4;
        const NOTIFICATION_CENTER = 1 << 5;
        const CRITICAL_ALERT = 1 << 6;
        const ANNOUNCEMENT = 1 << 7;
        const TIME_SENSITIVE = 1 << 8;
        const SCHEDULED_DELIVERY = 1 << 9;
    }
}

bitflags! {
    /// Options requested from the platform when asking for authorization
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct NotificationOptions: u32 {
        const BADGE = 1 << 0;
        const SOUND = 1 << 1;
        const ALERT = 1 << 2;
        const CAR_PLAY = 1 << 3;
        const CRITICAL_ALERT = 1 << 4;
        const PROVIDES_APP_NOTIFICATION_SETTINGS = 1 << 5;
        const PROVISIONAL = 1 << 6;
    }
}

impl Default for AuthorizedSettings {
    fn default() -> Self {
        Self::empty()
    }
}

impl Default for NotificationOptions {
    fn default() -> Self {
        Self::ALERT | Self::BADGE | Self::SOUND
    }
}

/// Last authorization state reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthorizationSnapshot {
    pub status: AuthorizationStatus,
    pub granted_settings: AuthorizedSettings,
    /// Whether the user has already seen the permission prompt
    pub prompted_before: bool,
}

impl AuthorizationSnapshot {
    /// Status authorizes delivery and at least one setting is enabled
    pub fn user_push_allowed(&self) -> bool {
        self.status.is_authorized() && !self.granted_settings.is_empty()
    }

    /// Derive a status from the mask granted for a set of requested options
    pub fn from_grant(requested: NotificationOptions, granted: AuthorizedSettings) -> Self {
        let status = if granted.is_empty() {
            AuthorizationStatus::Denied
        } else if requested.contains(NotificationOptions::PROVISIONAL) {
            AuthorizationStatus::Provisional
        } else {
            AuthorizationStatus::Authorized
        };

        Self {
            status,
            granted_settings: granted,
            prompted_before: true,
        }
    }
}

/// Registration provider: submits payloads and owns the permission prompt
pub trait RegistrationProvider: Send + Sync {
    /// Push the current registration payload to the remote service
    fn submit_registration_payload<'a>(
        &'a self,
        payload: &'a RegistrationPayload,
    ) -> PushFuture<'a, PushResult<()>>;

    /// Show the permission prompt and report the granted settings
    fn request_authorization(
        &self,
        options: NotificationOptions,
    ) -> PushFuture<'_, PushResult<AuthorizedSettings>>;

    /// Whether the app may be woken for background pushes
    fn background_refresh_available(&self) -> bool;
}

/// Channel/identity service the registration is performed against
pub trait ChannelService: Send + Sync {
    fn channel_id(&self) -> Option<String>;

    /// Current channel tags
    fn tags(&self) -> Vec<String>;

    /// Add tags to the channel. Tags already present are ignored.
    fn add_tags(&self, tags: &[String]);

    /// Opt-in and background flags from the last successful registration
    fn update_push_flags(&self, _opt_in: bool, _background: bool) {}
}
