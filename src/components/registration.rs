// Registration coordinator.
//
// Owns the authorization snapshot, the device token and the
// `should_update_registration` flag. All three are mutated under one lock.
// The flag is raised by every mutation of a payload input and cleared only
// after a successful submission that saw no concurrent change (tracked with a
// generation counter bumped on every mutation).
//
// The last successfully submitted payload is persisted. An update whose
// payload matches it clears the flag without contacting the provider, so a
// cold start with nothing new submits nothing.
//
// Submissions are serialized by an async mutex: a caller arriving while an
// update is in flight waits for it, then re-checks the flag, so at most one
// provider call is outstanding and repeated calls without changes submit
// nothing. The state lock is never held across the provider call.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::completion::Completion;
use super::config::PushConfig;
use super::features::{FeatureEnablement, Features};
use super::platform::{
    AuthorizationSnapshot, AuthorizationStatus, AuthorizedSettings, ChannelService,
    NotificationOptions, RegistrationProvider,
};
use super::quiet_time::TimeOfDay;
use super::settings::PushSettings;
use super::DeviceToken;

/// Quiet time bounds as sent to the registration service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietTimeRange {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

/// Fields submitted to keep the server-side channel in sync with the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPayload {
    pub channel_id: Option<String>,
    pub device_token: Option<DeviceToken>,
    pub opt_in: bool,
    pub background: bool,
    pub authorization_status: AuthorizationStatus,
    pub authorized_settings: AuthorizedSettings,
    pub requested_options: NotificationOptions,
    pub categories: Vec<String>,
    pub quiet_time_enabled: bool,
    pub quiet_time: Option<QuietTimeRange>,
    pub time_zone: String,
    pub badge: Option<i64>,
    pub tags: Vec<String>,
}

#[derive(Debug)]
struct RegistrationState {
    snapshot: AuthorizationSnapshot,
    device_token: Option<DeviceToken>,
    should_update: bool,
    generation: u64,
    requested_options: NotificationOptions,
    categories: BTreeSet<String>,
}

impl RegistrationState {
    fn mark_dirty(&mut self, reason: &str) {
        self.should_update = true;
        self.generation += 1;
        tracing::debug!(reason, generation = self.generation, "Registration out of date");
    }
}

/// Drives registration updates against the registration provider
pub struct RegistrationCoordinator {
    state: Mutex<RegistrationState>,
    update_lock: tokio::sync::Mutex<()>,
    settings: PushSettings,
    provider: Arc<dyn RegistrationProvider>,
    channel: Arc<dyn ChannelService>,
    features: Arc<dyn FeatureEnablement>,
    auto_badge: bool,
    request_authorization_on_enable: bool,
}

impl RegistrationCoordinator {
    /// Rehydrates the snapshot and token from `settings`. The first update
    /// after construction compares against the last persisted payload.
    pub fn new(
        config: &PushConfig,
        settings: PushSettings,
        provider: Arc<dyn RegistrationProvider>,
        channel: Arc<dyn ChannelService>,
        features: Arc<dyn FeatureEnablement>,
    ) -> Self {
        let state = RegistrationState {
            snapshot: settings.authorization_snapshot(),
            device_token: settings.device_token(),
            should_update: true,
            generation: 0,
            requested_options: config.requested_options,
            categories: BTreeSet::new(),
        };

        Self {
            state: Mutex::new(state),
            update_lock: tokio::sync::Mutex::new(()),
            settings,
            provider,
            channel,
            features,
            auto_badge: config.auto_badge,
            request_authorization_on_enable: config.request_authorization_on_enable,
        }
    }

    pub fn settings(&self) -> &PushSettings {
        &self.settings
    }

    pub fn authorization_snapshot(&self) -> AuthorizationSnapshot {
        self.state.lock().snapshot
    }

    pub fn device_token(&self) -> Option<DeviceToken> {
        self.state.lock().device_token.clone()
    }

    pub fn should_update_registration(&self) -> bool {
        self.state.lock().should_update
    }

    pub fn requested_options(&self) -> NotificationOptions {
        self.state.lock().requested_options
    }

    pub fn categories(&self) -> Vec<String> {
        self.state.lock().categories.iter().cloned().collect()
    }

    fn push_enabled(&self) -> bool {
        self.features.is_enabled(Features::PUSH)
    }

    /// Flag the registration as out of date
    pub fn mark_dirty(&self, reason: &str) {
        self.state.lock().mark_dirty(reason);
    }

    /// Store a platform-reported authorization change. Returns true if it changed.
    pub fn record_authorization(
        &self,
        status: AuthorizationStatus,
        granted_settings: AuthorizedSettings,
    ) -> bool {
        let mut state = self.state.lock();
        let previous = state.snapshot;
        let next = AuthorizationSnapshot {
            status,
            granted_settings,
            prompted_before: previous.prompted_before
                || status != AuthorizationStatus::NotDetermined,
        };

        if next == previous {
            return false;
        }

        tracing::info!(
            status = status.name(),
            settings = ?granted_settings,
            "Notification authorization changed"
        );
        state.snapshot = next;
        self.settings.set_authorization_snapshot(&next);
        state.mark_dirty("authorization");
        true
    }

    /// Store a device token. Returns true if it differs from the current one.
    pub fn record_device_token(&self, token: DeviceToken) -> bool {
        let mut state = self.state.lock();
        if state.device_token.as_ref() == Some(&token) {
            tracing::debug!(token = %token, "Device token unchanged");
            return false;
        }

        tracing::info!(token = %token, "Device token updated");
        self.settings.set_device_token(Some(&token));
        state.device_token = Some(token);
        state.mark_dirty("device token");
        true
    }

    /// Token registration failed. The current token and flag are kept so the
    /// next trigger retries.
    pub fn record_registration_failure(&self, error: &dyn std::fmt::Display) {
        tracing::warn!(error = %error, "Failed to register for remote notifications");
    }

    /// Change the options requested from the platform
    pub fn set_requested_options(&self, options: NotificationOptions) -> bool {
        let mut state = self.state.lock();
        if state.requested_options == options {
            return false;
        }
        state.requested_options = options;
        state.mark_dirty("requested options");
        true
    }

    /// Replace the registered notification category identifiers
    pub fn set_categories<I, S>(&self, categories: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let categories: BTreeSet<String> = categories.into_iter().map(Into::into).collect();
        let mut state = self.state.lock();
        if state.categories == categories {
            return false;
        }
        state.categories = categories;
        state.mark_dirty("categories");
        true
    }

    pub fn set_user_push_notifications_enabled(&self, enabled: bool) {
        self.settings.set_user_push_enabled(enabled);
        self.mark_dirty("user push enablement");
    }

    pub fn set_background_push_notifications_enabled(&self, enabled: bool) {
        self.settings.set_background_push_enabled(enabled);
        self.mark_dirty("background push enablement");
    }

    pub fn set_extended_permission_enabled(&self, enabled: bool) {
        self.settings.set_extended_permission_enabled(enabled);
        self.mark_dirty("extended permission");
    }

    pub fn set_quiet_time(&self, start: TimeOfDay, end: TimeOfDay) {
        self.settings.set_quiet_time(start, end);
        self.mark_dirty("quiet time");
    }

    pub fn set_quiet_time_enabled(&self, enabled: bool) {
        self.settings.set_quiet_time_enabled(enabled);
        self.mark_dirty("quiet time enablement");
    }

    pub fn set_time_zone(&self, time_zone: Option<chrono_tz::Tz>) {
        self.settings.set_time_zone(time_zone);
        self.mark_dirty("quiet time zone");
    }

    pub fn set_badge_number(&self, badge: i64) {
        self.settings.set_badge(badge);
        if self.auto_badge {
            self.mark_dirty("badge");
        }
    }

    pub fn reset_badge(&self) {
        self.set_badge_number(0);
    }

    /// Authorization allows user-visible notifications
    pub fn user_push_allowed(&self) -> bool {
        self.state.lock().snapshot.user_push_allowed()
    }

    /// Push is enabled, the platform can wake the app, and a token exists
    pub fn background_push_allowed(&self) -> bool {
        let has_token = self.state.lock().device_token.is_some();
        self.push_enabled() && self.provider.background_refresh_available() && has_token
    }

    /// Snapshot every payload input
    pub fn build_payload(&self) -> RegistrationPayload {
        let (snapshot, device_token, requested_options, categories) = {
            let state = self.state.lock();
            (
                state.snapshot,
                state.device_token.clone(),
                state.requested_options,
                state.categories.iter().cloned().collect::<Vec<_>>(),
            )
        };

        let opt_in = snapshot.user_push_allowed()
            && self.settings.user_push_enabled()
            && device_token.is_some();
        let background = self.background_push_allowed() && self.settings.background_push_enabled();

        let quiet_time = self.settings.quiet_time();
        let time_zone = quiet_time
            .as_ref()
            .map(|window| window.time_zone)
            .unwrap_or_default()
            .resolved_name();

        RegistrationPayload {
            channel_id: self.channel.channel_id(),
            device_token,
            opt_in,
            background,
            authorization_status: snapshot.status,
            authorized_settings: snapshot.granted_settings,
            requested_options,
            categories,
            quiet_time_enabled: quiet_time.as_ref().is_some_and(|window| window.enabled),
            quiet_time: quiet_time.map(|window| QuietTimeRange {
                start: window.start,
                end: window.end,
            }),
            time_zone,
            badge: self.auto_badge.then(|| self.settings.badge()),
            tags: self.channel.tags(),
        }
    }

    /// Submit the registration payload if it is out of date.
    ///
    /// Returns true when the registration is up to date afterwards. Calls made
    /// while a submission is in flight wait for it and re-evaluate the flag.
    pub async fn update_registration(&self) -> bool {
        let _in_flight = match self.update_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!("Registration update in flight, waiting");
                self.update_lock.lock().await
            },
        };

        let generation = {
            let state = self.state.lock();
            if !state.should_update {
                tracing::debug!("Registration up to date, skipping update");
                return true;
            }
            state.generation
        };

        let payload = self.build_payload();
        if self.settings.last_registration_payload().as_ref() == Some(&payload) {
            tracing::debug!("Payload matches last registration, skipping submission");
            self.settle(generation, &payload);
            return true;
        }

        tracing::debug!(
            opt_in = payload.opt_in,
            background = payload.background,
            "Submitting registration payload"
        );

        match self.provider.submit_registration_payload(&payload).await {
            Ok(()) => {
                self.settings.set_last_registration_payload(&payload);
                self.settle(generation, &payload);
                tracing::info!("Registration updated");
                true
            },
            Err(e) => {
                tracing::warn!(error = %e, "Registration update failed, will retry on next trigger");
                false
            },
        }
    }

    // Clear the flag unless an input changed after `generation` was read
    fn settle(&self, generation: u64, payload: &RegistrationPayload) {
        {
            let mut state = self.state.lock();
            if state.generation == generation {
                state.should_update = false;
            } else {
                tracing::debug!("Registration inputs changed during update, staying dirty");
            }
        }
        self.channel
            .update_push_flags(payload.opt_in, payload.background);
    }

    /// Completion-handler form of [`update_registration`](Self::update_registration)
    pub async fn update_registration_with(&self, completion: Completion<bool>) {
        completion.complete(self.update_registration().await);
    }

    /// Update registration if push is enabled. `None` when gated off.
    pub async fn trigger_update(&self) -> Option<bool> {
        if !self.push_enabled() {
            tracing::debug!("Push disabled, not updating registration");
            return None;
        }
        Some(self.update_registration().await)
    }

    pub async fn notify_authorization_changed(
        &self,
        status: AuthorizationStatus,
        granted_settings: AuthorizedSettings,
    ) -> Option<bool> {
        self.record_authorization(status, granted_settings);
        self.trigger_update().await
    }

    pub async fn notify_device_token_received(&self, token: DeviceToken) -> Option<bool> {
        self.record_device_token(token);
        self.trigger_update().await
    }

    pub fn notify_device_token_registration_failed(&self, error: &dyn std::fmt::Display) {
        self.record_registration_failure(error);
    }

    /// Prompt for authorization with the requested options and record the grant
    pub async fn request_authorization(&self) -> Option<AuthorizationSnapshot> {
        let options = self.requested_options();
        match self.provider.request_authorization(options).await {
            Ok(granted) => {
                let grant = AuthorizationSnapshot::from_grant(options, granted);
                self.record_authorization(grant.status, grant.granted_settings);
                Some(self.authorization_snapshot())
            },
            Err(e) => {
                tracing::warn!(error = %e, "Authorization request failed");
                None
            },
        }
    }

    /// Persist the user push preference, prompt if it can still matter, then update
    pub async fn enable_user_push_notifications(&self, enabled: bool) -> Option<bool> {
        self.set_user_push_notifications_enabled(enabled);
        if !self.push_enabled() {
            return None;
        }

        let status = self.authorization_snapshot().status;
        if enabled
            && self.request_authorization_on_enable
            && status.can_request(self.settings.extended_permission_enabled())
        {
            self.request_authorization().await;
        }
        self.trigger_update().await
    }
}

impl std::fmt::Debug for RegistrationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationCoordinator")
            .field("state", &*self.state.lock())
            .field("auto_badge", &self.auto_badge)
            .finish_non_exhaustive()
    }
}
