// Runtime feature enablement (privacy gate)

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

bitflags! {
    /// SDK capabilities that can be switched off at runtime
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Features: u32 {
        const IN_APP_AUTOMATION = 1 << 0;
        const MESSAGE_CENTER = 1 << 1;
        const PUSH = 1 << 2;
        const CHAT = 1 << 3;
        const ANALYTICS = 1 << 4;
        const TAGS_AND_ATTRIBUTES = 1 << 5;
        const CONTACTS = 1 << 6;
        const LOCATION = 1 << 7;
    }
}

impl Features {
    pub const NONE: Features = Features::empty();
    pub const ALL: Features = Features::all();
}

/// Source of truth for which features may run
pub trait FeatureEnablement: Send + Sync {
    /// True when every feature in `features` is enabled
    fn is_enabled(&self, features: Features) -> bool;
}

/// Toggleable feature mask with change notifications
#[derive(Debug)]
pub struct PrivacyManager {
    enabled: watch::Sender<Features>,
}

impl PrivacyManager {
    pub fn new(enabled: Features) -> Self {
        let (enabled, _) = watch::channel(enabled);
        Self { enabled }
    }

    pub fn enabled_features(&self) -> Features {
        *self.enabled.borrow()
    }

    pub fn set_enabled_features(&self, features: Features) {
        self.update(|_| features);
    }

    pub fn enable(&self, features: Features) {
        self.update(|current| current | features);
    }

    pub fn disable(&self, features: Features) {
        self.update(|current| current - features);
    }

    fn update(&self, change: impl FnOnce(Features) -> Features) {
        let mut transition = None;
        self.enabled.send_if_modified(|current| {
            let next = change(*current);
            if next == *current {
                return false;
            }
            transition = Some((*current, next));
            *current = next;
            true
        });

        if let Some((previous, current)) = transition {
            tracing::info!(?previous, ?current, "Enabled features changed");
        }
    }

    /// Receiver that observes every change to the enabled mask
    pub fn subscribe(&self) -> watch::Receiver<Features> {
        self.enabled.subscribe()
    }
}

impl Default for PrivacyManager {
    fn default() -> Self {
        Self::new(Features::ALL)
    }
}

impl FeatureEnablement for PrivacyManager {
    fn is_enabled(&self, features: Features) -> bool {
        !features.is_empty() && self.enabled_features().contains(features)
    }
}
