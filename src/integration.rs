// Platform-facing façade.
//
// `PushIntegration` receives every callback the notification platform
// delivers and fans it out to the registration coordinator, the presentation
// resolver and the application delegate. Each entry point checks the push
// feature first; when it is disabled the entry point only honours the
// platform contract (completions still fire with a neutral value) and leaves
// all state untouched.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::components::completion::Completion;
use crate::components::config::PushConfig;
use crate::components::features::{FeatureEnablement, Features};
use crate::components::migration::TagMigrator;
use crate::components::notification::{
    BackgroundFetchResult, EventSink, NotificationKind, NotificationResponse, PushNotification,
    PushReceivedEvent,
};
use crate::components::platform::{
    AuthorizationStatus, AuthorizedSettings, ChannelService, RegistrationProvider,
};
use crate::components::presentation::{
    PresentationExtender, PresentationOptions, PresentationResolver,
};
use crate::components::registration::RegistrationCoordinator;
use crate::components::settings::{KeyValueStore, PushSettings};
use crate::components::{DeviceToken, PushFuture};

/// Application callbacks for inbound notifications. Every method has a neutral default.
pub trait PushNotificationDelegate: Send + Sync {
    fn received_foreground_notification<'a>(
        &'a self,
        _notification: &'a PushNotification,
        _options: PresentationOptions,
    ) -> PushFuture<'a, ()> {
        Box::pin(async {})
    }

    fn received_background_notification<'a>(
        &'a self,
        _notification: &'a PushNotification,
    ) -> PushFuture<'a, BackgroundFetchResult> {
        Box::pin(async { BackgroundFetchResult::NoData })
    }

    fn received_notification_response<'a>(
        &'a self,
        _response: &'a NotificationResponse,
    ) -> PushFuture<'a, ()> {
        Box::pin(async {})
    }
}

/// Result handed back to the platform for a received notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedOutcome {
    /// Resolved presentation, foreground only
    pub presentation: Option<PresentationOptions>,
    pub fetch_result: BackgroundFetchResult,
}

impl ReceivedOutcome {
    pub const NEUTRAL: ReceivedOutcome = ReceivedOutcome {
        presentation: None,
        fetch_result: BackgroundFetchResult::NoData,
    };
}

/// Push integration entry points
pub struct PushIntegration {
    config: PushConfig,
    features: Arc<dyn FeatureEnablement>,
    channel: Arc<dyn ChannelService>,
    registration: RegistrationCoordinator,
    presentation: PresentationResolver,
    migrator: TagMigrator,
    delegate: RwLock<Option<Arc<dyn PushNotificationDelegate>>>,
    events: Option<Arc<dyn EventSink>>,
    launch_response: Mutex<Option<NotificationResponse>>,
}

impl PushIntegration {
    /// Wire the components together and run the legacy tag migration
    pub fn new(
        config: PushConfig,
        store: Arc<dyn KeyValueStore>,
        provider: Arc<dyn RegistrationProvider>,
        channel: Arc<dyn ChannelService>,
        features: Arc<dyn FeatureEnablement>,
    ) -> Self {
        let settings = PushSettings::new(store).with_defaults(
            config.user_push_enabled_default,
            config.background_push_enabled_default,
        );
        let registration = RegistrationCoordinator::new(
            &config,
            settings.clone(),
            provider,
            Arc::clone(&channel),
            Arc::clone(&features),
        );
        let presentation = PresentationResolver::new(
            config.default_presentation_options,
            config.extender_timeout(),
        );

        let integration = Self {
            migrator: TagMigrator::new(settings),
            config,
            features,
            channel,
            registration,
            presentation,
            delegate: RwLock::new(None),
            events: None,
            launch_response: Mutex::new(None),
        };
        integration.migrate_legacy_tags();
        integration
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &PushConfig {
        &self.config
    }

    pub fn registration(&self) -> &RegistrationCoordinator {
        &self.registration
    }

    pub fn presentation(&self) -> &PresentationResolver {
        &self.presentation
    }

    pub fn migrator(&self) -> &TagMigrator {
        &self.migrator
    }

    pub fn set_delegate(&self, delegate: Option<Arc<dyn PushNotificationDelegate>>) {
        *self.delegate.write() = delegate;
    }

    pub fn register_presentation_extender(&self, extender: Arc<dyn PresentationExtender>) {
        self.presentation.register_extender(extender);
    }

    /// Response that launched the app, consumed on read
    pub fn take_launch_notification_response(&self) -> Option<NotificationResponse> {
        self.launch_response.lock().take()
    }

    fn push_enabled(&self) -> bool {
        self.features.is_enabled(Features::PUSH)
    }

    fn delegate(&self) -> Option<Arc<dyn PushNotificationDelegate>> {
        self.delegate.read().clone()
    }

    /// Run the tag migration if tags are enabled and it has not run yet
    pub fn migrate_legacy_tags(&self) -> bool {
        if !self.config.migrate_legacy_tags
            || !self.features.is_enabled(Features::TAGS_AND_ATTRIBUTES)
        {
            return false;
        }
        self.migrator.migrate_from_settings(self.channel.as_ref())
    }

    // Platform callbacks

    pub async fn on_device_token_registered(&self, token: &[u8]) -> Option<bool> {
        if !self.push_enabled() {
            tracing::debug!("Push disabled, ignoring device token");
            return None;
        }

        match DeviceToken::from_bytes(token) {
            Ok(token) => self.registration.notify_device_token_received(token).await,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring device token");
                None
            },
        }
    }

    pub fn on_device_token_registration_failed(&self, error: &dyn std::fmt::Display) {
        if !self.push_enabled() {
            return;
        }
        self.registration.notify_device_token_registration_failed(error);
    }

    pub async fn on_authorization_status_changed(
        &self,
        status: AuthorizationStatus,
        granted_settings: AuthorizedSettings,
    ) -> Option<bool> {
        if !self.push_enabled() {
            tracing::debug!("Push disabled, ignoring authorization change");
            return None;
        }
        self.registration
            .notify_authorization_changed(status, granted_settings)
            .await
    }

    /// Foreground presentation request from the platform
    pub async fn on_notification_will_present(
        &self,
        notification: PushNotification,
        completion: Completion<PresentationOptions>,
    ) {
        if !self.push_enabled() {
            completion.complete(PresentationOptions::empty());
            return;
        }
        self.presentation
            .resolve_presentation_options(&notification, completion)
            .await;
    }

    pub async fn on_notification_received(
        &self,
        notification: PushNotification,
        foreground: bool,
        completion: Completion<ReceivedOutcome>,
    ) {
        if !self.push_enabled() {
            tracing::debug!("Push disabled, completing notification without handling");
            completion.complete(ReceivedOutcome::NEUTRAL);
            return;
        }

        self.record_push_received(&notification);

        let outcome = if foreground {
            self.handle_foreground_notification(&notification).await
        } else {
            self.handle_background_notification(&notification).await
        };
        completion.complete(outcome);
    }

    pub async fn on_notification_response(
        &self,
        response: NotificationResponse,
        completion: Completion<()>,
    ) {
        if !self.push_enabled() {
            completion.complete(());
            return;
        }

        self.handle_notification_response(response).await;
        completion.complete(());
    }

    // Lifecycle triggers

    /// App returned to the foreground: retry a pending registration
    pub async fn on_app_foreground(&self) -> Option<bool> {
        self.registration.trigger_update().await
    }

    pub async fn on_background_refresh_status_changed(&self) -> Option<bool> {
        if !self.push_enabled() {
            return None;
        }
        self.registration.mark_dirty("background refresh status");
        self.registration.trigger_update().await
    }

    /// Re-evaluate after the enabled feature mask changed
    pub async fn on_enabled_features_changed(&self) -> Option<bool> {
        self.registration.mark_dirty("enabled features");
        self.migrate_legacy_tags();
        self.registration.trigger_update().await
    }

    /// Follow a feature mask receiver, reacting to every change.
    ///
    /// The task holds a weak reference and exits once the integration is
    /// dropped or the sender closes.
    pub fn watch_features(self: &Arc<Self>, mut changes: watch::Receiver<Features>) -> JoinHandle<()> {
        let integration = Arc::downgrade(self);
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let Some(integration) = integration.upgrade() else {
                    tracing::debug!("Integration dropped, stopping feature watcher");
                    break;
                };
                integration.on_enabled_features_changed().await;
            }
        })
    }

    /// Explicit registration update, gated by the push feature
    pub async fn update_registration(&self) -> Option<bool> {
        self.registration.trigger_update().await
    }

    pub async fn enable_user_push_notifications(&self, enabled: bool) -> Option<bool> {
        self.registration.enable_user_push_notifications(enabled).await
    }

    // Handlers

    fn record_push_received(&self, notification: &PushNotification) {
        if let Some(events) = &self.events
            && self.features.is_enabled(Features::ANALYTICS)
        {
            events.add_event(PushReceivedEvent::from_notification(notification));
        }
    }

    async fn handle_foreground_notification(
        &self,
        notification: &PushNotification,
    ) -> ReceivedOutcome {
        if notification.kind() == NotificationKind::Malformed {
            tracing::warn!(
                notification_id = %notification.identifier,
                "Malformed foreground notification, ignoring"
            );
            return ReceivedOutcome::NEUTRAL;
        }

        let options = self.presentation.resolve(notification).await;
        if let Some(delegate) = self.delegate() {
            delegate
                .received_foreground_notification(notification, options)
                .await;
        }

        ReceivedOutcome {
            presentation: Some(options),
            fetch_result: BackgroundFetchResult::NoData,
        }
    }

    async fn handle_background_notification(
        &self,
        notification: &PushNotification,
    ) -> ReceivedOutcome {
        let kind = notification.kind();
        if kind == NotificationKind::Malformed {
            tracing::warn!(
                notification_id = %notification.identifier,
                "Malformed background notification, treating as no-op"
            );
            return ReceivedOutcome::NEUTRAL;
        }

        // Only payloads asking for background work wake the delegate
        if kind != NotificationKind::Silent && !notification.is_content_available() {
            tracing::debug!(
                notification_id = %notification.identifier,
                "User-visible notification delivered in background, no fetch requested"
            );
            return ReceivedOutcome::NEUTRAL;
        }

        tracing::debug!(
            notification_id = %notification.identifier,
            ?kind,
            "Handling background notification"
        );

        let fetch_result = match self.delegate() {
            Some(delegate) => delegate.received_background_notification(notification).await,
            None => BackgroundFetchResult::NoData,
        };

        ReceivedOutcome {
            presentation: None,
            fetch_result,
        }
    }

    async fn handle_notification_response(&self, response: NotificationResponse) {
        tracing::debug!(
            notification_id = %response.notification.identifier,
            action = %response.action_identifier,
            "Handling notification response"
        );

        if let Some(delegate) = self.delegate() {
            delegate.received_notification_response(&response).await;
        }

        if response.is_default_action() {
            *self.launch_response.lock() = Some(response);
        }
    }
}

impl std::fmt::Debug for PushIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushIntegration")
            .field("config", &self.config)
            .field("registration", &self.registration)
            .field("extenders", &self.presentation.extender_count())
            .finish_non_exhaustive()
    }
}
