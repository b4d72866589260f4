// Inbound notification model: payload inspection, responses, fetch results
// and the push-received analytics event

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::PushResult;

/// Send id reported when the payload carries none
pub const MISSING_SEND_ID: &str = "MISSING_SEND_ID";
pub const DEFAULT_ACTION_IDENTIFIER: &str = "com.apple.UNNotificationDefaultActionIdentifier";
pub const DISMISS_ACTION_IDENTIFIER: &str = "com.apple.UNNotificationDismissActionIdentifier";

const APS_KEY: &str = "aps";
const PUSH_ID_KEY: &str = "_";
const METADATA_KEY: &str = "com.urbanairship.metadata";
const CONTENT_AVAILABLE_KEY: &str = "content-available";
const VISIBLE_APS_KEYS: [&str; 3] = ["alert", "sound", "badge"];

/// How an inbound payload should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Alert, sound or badge present
    UserVisible,
    /// Background wake-up without visible content
    Silent,
    /// Payload without a usable `aps` dictionary
    Malformed,
}

impl NotificationKind {
    pub fn is_background(&self) -> bool {
        !matches!(self, NotificationKind::UserVisible)
    }
}

/// Remote notification delivered by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushNotification {
    pub identifier: String,
    pub payload: Map<String, Value>,
}

impl PushNotification {
    pub fn new(payload: Map<String, Value>) -> Self {
        Self {
            identifier: Uuid::new_v4().to_string(),
            payload,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Parse a raw JSON payload. Non-object payloads are wrapped so that
    /// classification still sees them as malformed instead of failing.
    pub fn from_json(json: &str) -> PushResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        let payload = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("payload".to_string(), other);
                map
            },
        };
        Ok(Self::new(payload))
    }

    pub fn aps(&self) -> Option<&Map<String, Value>> {
        self.payload.get(APS_KEY)?.as_object()
    }

    pub fn push_id(&self) -> &str {
        self.payload
            .get(PUSH_ID_KEY)
            .and_then(Value::as_str)
            .unwrap_or(MISSING_SEND_ID)
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.payload.get(METADATA_KEY)
    }

    pub fn is_content_available(&self) -> bool {
        self.aps()
            .and_then(|aps| aps.get(CONTENT_AVAILABLE_KEY))
            .is_some_and(|value| match value {
                Value::Number(n) => n.as_i64() == Some(1),
                Value::Bool(b) => *b,
                Value::String(s) => s == "1",
                _ => false,
            })
    }

    pub fn kind(&self) -> NotificationKind {
        let Some(aps) = self.aps() else {
            return NotificationKind::Malformed;
        };

        if VISIBLE_APS_KEYS.iter().any(|key| aps.contains_key(*key)) {
            NotificationKind::UserVisible
        } else {
            NotificationKind::Silent
        }
    }
}

/// User interaction with a delivered notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub notification: PushNotification,
    pub action_identifier: String,
    /// Text entered into a text-input action
    pub user_text: Option<String>,
}

impl NotificationResponse {
    pub fn new(notification: PushNotification, action_identifier: impl Into<String>) -> Self {
        Self {
            notification,
            action_identifier: action_identifier.into(),
            user_text: None,
        }
    }

    pub fn with_user_text(mut self, text: impl Into<String>) -> Self {
        self.user_text = Some(text.into());
        self
    }

    pub fn is_default_action(&self) -> bool {
        self.action_identifier == DEFAULT_ACTION_IDENTIFIER
    }

    pub fn is_dismiss_action(&self) -> bool {
        self.action_identifier == DISMISS_ACTION_IDENTIFIER
    }
}

/// Result reported back for a background notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackgroundFetchResult {
    NewData,
    NoData,
    Failed,
}

impl BackgroundFetchResult {
    /// Combine two results. New data wins over failure, failure over no data.
    pub fn merge(self, other: BackgroundFetchResult) -> BackgroundFetchResult {
        use BackgroundFetchResult::*;
        match (self, other) {
            (NewData, _) | (_, NewData) => NewData,
            (Failed, _) | (_, Failed) => Failed,
            _ => NoData,
        }
    }
}

/// Analytics event emitted for every handled push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushReceivedEvent {
    pub push_id: String,
    pub metadata: Option<Value>,
}

impl PushReceivedEvent {
    pub const EVENT_TYPE: &'static str = "push_received";

    pub fn from_notification(notification: &PushNotification) -> Self {
        Self {
            push_id: notification.push_id().to_string(),
            metadata: notification.metadata().cloned(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    pub fn data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        if let Some(metadata) = &self.metadata {
            data.insert("metadata".to_string(), metadata.clone());
        }
        data.insert("push_id".to_string(), Value::from(self.push_id.clone()));
        data
    }
}

/// Receives analytics events
pub trait EventSink: Send + Sync {
    fn add_event(&self, event: PushReceivedEvent);
}
