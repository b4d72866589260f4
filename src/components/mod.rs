// Push registration and notification handling components
// Registration state, presentation merging, tag migration and the feature gate
// are modelled as independent pieces wired together by the integration façade

use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod completion;
pub mod config;
pub mod features;
pub mod migration;
pub mod notification;
pub mod platform;
pub mod presentation;
pub mod quiet_time;
pub mod registration;
pub mod settings;

pub use completion::Completion;
pub use config::PushConfig;
pub use features::{FeatureEnablement, Features, PrivacyManager};
pub use migration::{MAX_TAG_LENGTH, TagMigrator, normalize_tags};
pub use notification::{
    BackgroundFetchResult, DEFAULT_ACTION_IDENTIFIER, DISMISS_ACTION_IDENTIFIER, EventSink,
    MISSING_SEND_ID, NotificationKind, NotificationResponse, PushNotification,
    PushReceivedEvent,
};
pub use platform::{
    AuthorizationSnapshot, AuthorizationStatus, AuthorizedSettings, ChannelService,
    NotificationOptions, RegistrationProvider,
};
pub use presentation::{
    CompletionBarrier, Contribution, PresentationExtender, PresentationOptions,
    PresentationResolver,
};
pub use quiet_time::{QuietTimeWindow, TimeOfDay, TimeZoneRef};
pub use registration::{RegistrationCoordinator, RegistrationPayload};
pub use settings::{KeyValueStore, PushSettings, keys};

/// Boxed future returned by collaborator traits
pub type PushFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Device token reported by the notification platform, rendered as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceToken(String);

impl DeviceToken {
    /// Render raw token bytes. Empty tokens are rejected.
    pub fn from_bytes(bytes: &[u8]) -> PushResult<Self> {
        if bytes.is_empty() {
            return Err(PushError::InvalidDeviceToken);
        }

        let mut rendered = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            // Writing into a String cannot fail
            let _ = write!(rendered, "{byte:02x}");
        }
        Ok(Self(rendered))
    }

    /// Accept an already rendered token, normalizing case and stripping
    /// the separators some platforms add (`<ab cd>`).
    pub fn from_hex(hex: &str) -> PushResult<Self> {
        let cleaned: String = hex
            .chars()
            .filter(|c| !matches!(c, '<' | '>' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();

        if cleaned.is_empty()
            || cleaned.len() % 2 != 0
            || !cleaned.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(PushError::InvalidDeviceToken);
        }
        Ok(Self(cleaned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error types surfaced by collaborators and the settings layer
#[derive(Debug, Error)]
pub enum PushError {
    /// The registration provider rejected or failed to deliver a payload
    #[error("Registration error: {message}")]
    Registration { message: String },
    /// The platform failed to answer an authorization request
    #[error("Authorization error: {message}")]
    Authorization { message: String },
    /// Token bytes could not be rendered
    #[error("Invalid device token")]
    InvalidDeviceToken,
    /// Persisted key/value storage failure
    #[error("Storage error for key '{key}': {message}")]
    Storage { key: String, message: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid configuration value
    #[error("Configuration error in {field}: {message}")]
    Config { field: String, message: String },
    #[error("Timeout error in {operation} after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },
}

/// Type alias for push results
pub type PushResult<T> = Result<T, PushError>;
