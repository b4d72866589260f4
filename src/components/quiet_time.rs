// Quiet time window carried in the registration payload

use chrono::{Local, NaiveTime, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{PushError, PushResult};

/// Wall-clock time of day with minute precision, serialized as `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> PushResult<Self> {
        if hour > 23 || minute > 59 {
            return Err(PushError::Config {
                field: "quiet_time".to_string(),
                message: format!("invalid time of day {:02}:{:02}", hour, minute),
            });
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn parse(value: &str) -> PushResult<Self> {
        let time = NaiveTime::parse_from_str(value, "%H:%M").map_err(|e| PushError::Config {
            field: "quiet_time".to_string(),
            message: format!("invalid time of day '{}': {}", value, e),
        })?;
        Self::new(time.hour() as u8, time.minute() as u8)
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TimeOfDay::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Time zone the quiet time window is evaluated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeZoneRef {
    Named(Tz),
    /// Device local time zone
    #[default]
    Local,
}

impl TimeZoneRef {
    pub fn from_option(tz: Option<Tz>) -> Self {
        tz.map(TimeZoneRef::Named).unwrap_or_default()
    }

    /// Name sent to the registration service. The local zone is reported as its current UTC offset.
    pub fn resolved_name(&self) -> String {
        match self {
            TimeZoneRef::Named(tz) => tz.name().to_string(),
            TimeZoneRef::Local => Local::now().offset().to_string(),
        }
    }
}

/// Quiet time configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuietTimeWindow {
    pub enabled: bool,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub time_zone: TimeZoneRef,
}
