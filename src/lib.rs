//! Push registration and notification handling core
//!
//! This crate tracks device push authorization, keeps the remote push
//! registration in sync with the local channel, merges foreground presentation
//! options from application extenders, and migrates legacy tag data onto the
//! channel exactly once. Everything runs behind a runtime-toggleable feature
//! gate.
//!
//! The notification platform, the registration transport and persistent
//! storage are collaborators supplied through traits; see
//! [`RegistrationProvider`], [`ChannelService`], [`KeyValueStore`] and
//! [`FeatureEnablement`].

pub mod backends;
pub mod components;
pub mod integration;

use std::sync::Arc;

// Re-export all components for convenience
pub use backends::*;
pub use components::*;
pub use integration::{PushIntegration, PushNotificationDelegate, ReceivedOutcome};

/// Builder for wiring a [`PushIntegration`] with fluent API
pub struct PushIntegrationBuilder {
    config: PushConfig,
    store_backend: StoreBackend,
    store: Option<Arc<dyn KeyValueStore>>,
    channel: Option<Arc<dyn ChannelService>>,
    features: Option<Arc<dyn FeatureEnablement>>,
    events: Option<Arc<dyn EventSink>>,
    delegate: Option<Arc<dyn PushNotificationDelegate>>,
    extenders: Vec<Arc<dyn PresentationExtender>>,
}

impl PushIntegrationBuilder {
    pub fn new() -> Self {
        Self {
            config: PushConfig::default(),
            store_backend: StoreBackend::default(),
            store: None,
            channel: None,
            features: None,
            events: None,
            delegate: None,
            extenders: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: PushConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store_backend(mut self, backend: StoreBackend) -> Self {
        self.store_backend = backend;
        self
    }

    /// Use an existing store instead of creating one from the backend
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_channel(mut self, channel: Arc<dyn ChannelService>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_features(mut self, features: Arc<dyn FeatureEnablement>) -> Self {
        self.features = Some(features);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn PushNotificationDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn with_extender(mut self, extender: Arc<dyn PresentationExtender>) -> Self {
        self.extenders.push(extender);
        self
    }

    pub fn build(self, provider: Arc<dyn RegistrationProvider>) -> PushResult<PushIntegration> {
        self.config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => StoreBackendFactory::create_store(&self.store_backend)?,
        };
        let channel = self
            .channel
            .unwrap_or_else(|| Arc::new(MemoryChannel::new()));
        let features = self
            .features
            .unwrap_or_else(|| Arc::new(PrivacyManager::default()));

        let mut integration = PushIntegration::new(self.config, store, provider, channel, features);
        if let Some(events) = self.events {
            integration = integration.with_event_sink(events);
        }
        integration.set_delegate(self.delegate);
        for extender in self.extenders {
            integration.register_presentation_extender(extender);
        }
        Ok(integration)
    }
}

impl Default for PushIntegrationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
