// Push integration configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::platform::NotificationOptions;
use super::presentation::PresentationOptions;
use super::{PushError, PushResult};

/// Runtime configuration for the push integration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Options requested when prompting for authorization
    pub requested_options: NotificationOptions,
    /// Foreground presentation when no extender is registered
    pub default_presentation_options: PresentationOptions,
    /// Upper bound on waiting for presentation extenders
    pub extender_timeout_ms: Option<u64>,
    pub user_push_enabled_default: bool,
    pub background_push_enabled_default: bool,
    /// Prompt for authorization when user push gets enabled
    pub request_authorization_on_enable: bool,
    /// Include the badge number in the registration payload
    pub auto_badge: bool,
    pub migrate_legacy_tags: bool,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            requested_options: NotificationOptions::default(),
            default_presentation_options: PresentationOptions::empty(),
            extender_timeout_ms: Some(5_000),
            user_push_enabled_default: false,
            background_push_enabled_default: true,
            request_authorization_on_enable: true,
            auto_badge: false,
            migrate_legacy_tags: true,
        }
    }
}

impl PushConfig {
    pub fn from_json_str(json: &str) -> PushResult<Self> {
        let config: PushConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> PushResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> PushResult<()> {
        if self.extender_timeout_ms == Some(0) {
            return Err(PushError::Config {
                field: "extender_timeout_ms".to_string(),
                message: "timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn extender_timeout(&self) -> Option<Duration> {
        self.extender_timeout_ms.map(Duration::from_millis)
    }
}
