//! Shared fakes for the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use kodegen_native_push::*;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::sync::Notify;

/// Registration provider with scripted outcomes and call accounting
pub struct ScriptedProvider {
    submissions: Mutex<Vec<RegistrationPayload>>,
    outcomes: Mutex<VecDeque<bool>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    held: AtomicBool,
    release: Notify,
    pub entered: Notify,
    grant: Mutex<AuthorizedSettings>,
    authorization_requests: AtomicUsize,
    authorization_fails: AtomicBool,
    background_refresh: AtomicBool,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            submissions: Mutex::new(Vec::new()),
            outcomes: Mutex::new(VecDeque::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            held: AtomicBool::new(false),
            release: Notify::new(),
            entered: Notify::new(),
            grant: Mutex::new(AuthorizedSettings::ALERT | AuthorizedSettings::SOUND),
            authorization_requests: AtomicUsize::new(0),
            authorization_fails: AtomicBool::new(false),
            background_refresh: AtomicBool::new(true),
        })
    }

    /// Submissions block until [`release`](Self::release) is called
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    /// Queue outcomes for the next submissions. Unscripted submissions succeed.
    pub fn script(&self, outcomes: &[bool]) {
        self.outcomes.lock().extend(outcomes.iter().copied());
    }

    pub fn set_grant(&self, grant: AuthorizedSettings) {
        *self.grant.lock() = grant;
    }

    /// Authorization requests fail instead of answering with the grant
    pub fn fail_authorization(&self, fail: bool) {
        self.authorization_fails.store(fail, Ordering::SeqCst);
    }

    pub fn set_background_refresh(&self, available: bool) {
        self.background_refresh.store(available, Ordering::SeqCst);
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    pub fn last_submission(&self) -> Option<RegistrationPayload> {
        self.submissions.lock().last().cloned()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn authorization_requests(&self) -> usize {
        self.authorization_requests.load(Ordering::SeqCst)
    }
}

impl RegistrationProvider for ScriptedProvider {
    fn submit_registration_payload<'a>(
        &'a self,
        payload: &'a RegistrationPayload,
    ) -> PushFuture<'a, PushResult<()>> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.submissions.lock().push(payload.clone());
            self.entered.notify_one();

            if self.held.load(Ordering::SeqCst) {
                self.release.notified().await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let succeed = self.outcomes.lock().pop_front().unwrap_or(true);
            if succeed {
                Ok(())
            } else {
                Err(PushError::Registration {
                    message: "scripted failure".to_string(),
                })
            }
        })
    }

    fn request_authorization(
        &self,
        _options: NotificationOptions,
    ) -> PushFuture<'_, PushResult<AuthorizedSettings>> {
        Box::pin(async move {
            self.authorization_requests.fetch_add(1, Ordering::SeqCst);
            if self.authorization_fails.load(Ordering::SeqCst) {
                return Err(PushError::Authorization {
                    message: "prompt unavailable".to_string(),
                });
            }
            Ok(*self.grant.lock())
        })
    }

    fn background_refresh_available(&self) -> bool {
        self.background_refresh.load(Ordering::SeqCst)
    }
}

/// Delegate that records what it saw
pub struct RecordingDelegate {
    pub foreground: Mutex<Vec<(String, PresentationOptions)>>,
    pub background: Mutex<Vec<String>>,
    pub responses: Mutex<Vec<String>>,
    fetch_result: BackgroundFetchResult,
}

impl RecordingDelegate {
    pub fn new(fetch_result: BackgroundFetchResult) -> Arc<Self> {
        Arc::new(Self {
            foreground: Mutex::new(Vec::new()),
            background: Mutex::new(Vec::new()),
            responses: Mutex::new(Vec::new()),
            fetch_result,
        })
    }
}

impl PushNotificationDelegate for RecordingDelegate {
    fn received_foreground_notification<'a>(
        &'a self,
        notification: &'a PushNotification,
        options: PresentationOptions,
    ) -> PushFuture<'a, ()> {
        Box::pin(async move {
            self.foreground
                .lock()
                .push((notification.identifier.clone(), options));
        })
    }

    fn received_background_notification<'a>(
        &'a self,
        notification: &'a PushNotification,
    ) -> PushFuture<'a, BackgroundFetchResult> {
        Box::pin(async move {
            self.background.lock().push(notification.identifier.clone());
            self.fetch_result
        })
    }

    fn received_notification_response<'a>(
        &'a self,
        response: &'a NotificationResponse,
    ) -> PushFuture<'a, ()> {
        Box::pin(async move {
            self.responses.lock().push(response.action_identifier.clone());
        })
    }
}

#[derive(Default)]
pub struct RecordingEvents {
    pub events: Mutex<Vec<PushReceivedEvent>>,
}

impl EventSink for RecordingEvents {
    fn add_event(&self, event: PushReceivedEvent) {
        self.events.lock().push(event);
    }
}

/// Everything a coordinator test needs, sharing one store
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<ScriptedProvider>,
    pub channel: Arc<MemoryChannel>,
    pub privacy: Arc<PrivacyManager>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_features(Features::ALL)
    }

    pub fn with_features(features: Features) -> Self {
        init_tracing();
        Self {
            store: Arc::new(MemoryStore::new()),
            provider: ScriptedProvider::new(),
            channel: Arc::new(MemoryChannel::with_channel_id("channel-id")),
            privacy: Arc::new(PrivacyManager::new(features)),
        }
    }

    pub fn settings(&self, config: &PushConfig) -> PushSettings {
        PushSettings::new(self.store.clone()).with_defaults(
            config.user_push_enabled_default,
            config.background_push_enabled_default,
        )
    }

    pub fn coordinator(&self) -> RegistrationCoordinator {
        self.coordinator_with(&PushConfig::default())
    }

    pub fn coordinator_with(&self, config: &PushConfig) -> RegistrationCoordinator {
        RegistrationCoordinator::new(
            config,
            self.settings(config),
            self.provider.clone(),
            self.channel.clone(),
            self.privacy.clone(),
        )
    }

    pub fn integration(&self) -> PushIntegration {
        self.integration_with(PushConfig::default())
    }

    pub fn integration_with(&self, config: PushConfig) -> PushIntegration {
        PushIntegration::new(
            config,
            self.store.clone(),
            self.provider.clone(),
            self.channel.clone(),
            self.privacy.clone(),
        )
    }
}

/// Route library logs through the test writer
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn token(byte: u8) -> DeviceToken {
    DeviceToken::from_bytes(&[byte; 8]).expect("non-empty token")
}

pub fn payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected JSON object, got {other}"),
    }
}

pub fn alert_notification(identifier: &str) -> PushNotification {
    PushNotification::new(payload(json!({
        "aps": { "alert": "hello", "sound": "default" },
        "_": "send-id",
        "com.urbanairship.metadata": "meta"
    })))
    .with_identifier(identifier)
}

pub fn silent_notification(identifier: &str) -> PushNotification {
    PushNotification::new(payload(json!({ "aps": { "content-available": 1 } })))
        .with_identifier(identifier)
}

/// Poll `condition` until it holds or a second passes
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
