// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Exercise session records and the upload schema stage.
//!
//! Clients (phones, older web builds) send loosely shaped JSON: numbers as
//! strings, missing device info, lowercase hands. [`RawSessionEntry`] accepts
//! all of that and [`RawSessionEntry::normalize`] turns it into a fully typed
//! [`ActivitySession`] in one place, or fails with a validation error.

use crate::error::AppError;
use crate::time_utils::parse_timestamp;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Rejection for an upload lacking any of the required fields. Clients match
/// on this exact text.
pub const MISSING_FIELDS_MESSAGE: &str =
    "Missing required fields: Username, Timestamp, ExerciseName";

/// Placeholder for any device attribute the client did not report.
pub const UNKNOWN_DEVICE_FIELD: &str = "unknown";

/// Which hand performed the exercise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Hand {
    #[default]
    Left,
    Right,
}

impl Hand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hand::Left => "Left",
            Hand::Right => "Right",
        }
    }

    /// Case-insensitive parse; `None` for anything but left/right.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Hand::Left),
            "right" => Some(Hand::Right),
            _ => None,
        }
    }
}

/// Device that recorded the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
    #[serde(rename = "OS")]
    pub os: String,
    pub app_version: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            manufacturer: UNKNOWN_DEVICE_FIELD.to_string(),
            model: UNKNOWN_DEVICE_FIELD.to_string(),
            os: UNKNOWN_DEVICE_FIELD.to_string(),
            app_version: UNKNOWN_DEVICE_FIELD.to_string(),
        }
    }
}

impl DeviceInfo {
    fn from_value(value: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = value else {
            return Self::default();
        };
        let field = |name: &str| {
            map.get(name)
                .and_then(as_text)
                .unwrap_or_else(|| UNKNOWN_DEVICE_FIELD.to_string())
        };
        Self {
            manufacturer: field("Manufacturer"),
            model: field("Model"),
            os: field("OS"),
            app_version: field("AppVersion"),
        }
    }
}

/// Primary key of a stored session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub username: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(username: &str, session_id: &str) -> Self {
        Self {
            username: username.trim().to_lowercase(),
            session_id: session_id.trim().to_string(),
        }
    }

    /// Document ID: both parts URL-encoded so the `:` separator is unambiguous.
    pub fn doc_id(&self) -> String {
        format!(
            "{}:{}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.session_id)
        )
    }
}

/// One stored exercise session.
///
/// `year` through `second` always equal `timestamp` decomposed in UTC; they
/// are only ever set by [`ActivitySession::derive_calendar_fields`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActivitySession {
    pub username: String,
    #[serde(rename = "SessionID")]
    pub session_id: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub timestamp: DateTime<Utc>,
    pub exercise_name: String,
    pub accuracy: f64,
    pub reps: i64,
    /// Seconds
    pub duration: f64,
    pub hand: Hand,
    pub device_info: DeviceInfo,
    pub scores: Vec<f64>,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl ActivitySession {
    pub fn key(&self) -> SessionKey {
        SessionKey {
            username: self.username.clone(),
            session_id: self.session_id.clone(),
        }
    }

    fn derive_calendar_fields(&mut self) {
        let ts = self.timestamp;
        self.year = ts.year();
        self.month = ts.month();
        self.day = ts.day();
        self.hour = ts.hour();
        self.minute = ts.minute();
        self.second = ts.second();
    }

    /// Names of the fields that differ from `other`; empty when identical.
    pub fn mismatched_fields(&self, other: &ActivitySession) -> Vec<&'static str> {
        let checks = [
            ("Username", self.username == other.username),
            ("SessionID", self.session_id == other.session_id),
            ("Timestamp", self.timestamp == other.timestamp),
            ("ExerciseName", self.exercise_name == other.exercise_name),
            ("Accuracy", self.accuracy == other.accuracy),
            ("Reps", self.reps == other.reps),
            ("Duration", self.duration == other.duration),
            ("Hand", self.hand == other.hand),
            ("DeviceInfo", self.device_info == other.device_info),
            ("Scores", self.scores == other.scores),
            (
                "Calendar",
                (self.year, self.month, self.day, self.hour, self.minute, self.second)
                    == (
                        other.year,
                        other.month,
                        other.day,
                        other.hour,
                        other.minute,
                        other.second,
                    ),
            ),
        ];
        checks
            .into_iter()
            .filter(|(_, same)| !same)
            .map(|(name, _)| name)
            .collect()
    }
}

/// Upload payload as received; every field optional and loosely typed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawSessionEntry {
    pub username: Option<Value>,
    #[serde(rename = "SessionID")]
    pub session_id: Option<Value>,
    pub timestamp: Option<Value>,
    pub exercise_name: Option<Value>,
    pub accuracy: Option<Value>,
    pub reps: Option<Value>,
    pub duration: Option<Value>,
    pub hand: Option<Value>,
    pub device_info: Option<Value>,
    pub scores: Option<Value>,
}

impl RawSessionEntry {
    /// Lowercased `Username` as sent, before any other validation.
    pub fn claimed_username(&self) -> Option<String> {
        self.username
            .as_ref()
            .and_then(as_text)
            .map(|u| u.to_lowercase())
    }

    /// Validate required fields and fill defaults, producing a typed record.
    pub fn normalize(self) -> Result<ActivitySession, AppError> {
        let username = self.username.as_ref().and_then(as_text);
        let timestamp_raw = self.timestamp.as_ref().and_then(as_text);
        let exercise_name = self.exercise_name.as_ref().and_then(as_text);

        let missing: Vec<&str> = [
            ("Username", username.is_none()),
            ("Timestamp", timestamp_raw.is_none()),
            ("ExerciseName", exercise_name.is_none()),
        ]
        .into_iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| name)
        .collect();

        let (Some(username), Some(timestamp_raw), Some(exercise_name)) =
            (username, timestamp_raw, exercise_name)
        else {
            tracing::debug!(missing = ?missing, "Rejected session without required fields");
            return Err(AppError::Validation(MISSING_FIELDS_MESSAGE.to_string()));
        };

        let timestamp = parse_timestamp(&timestamp_raw).ok_or_else(|| {
            AppError::Validation(format!("Invalid Timestamp: {}", timestamp_raw))
        })?;

        let session_id = self
            .session_id
            .as_ref()
            .and_then(as_text)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let hand = self
            .hand
            .as_ref()
            .and_then(as_text)
            .and_then(|h| Hand::parse(&h))
            .unwrap_or_default();

        let scores = match self.scores {
            Some(Value::Array(items)) => items.iter().filter_map(as_number).collect(),
            _ => Vec::new(),
        };

        let mut session = ActivitySession {
            username: username.to_lowercase(),
            session_id,
            timestamp,
            exercise_name,
            accuracy: self.accuracy.as_ref().and_then(as_number).unwrap_or(0.0),
            reps: self
                .reps
                .as_ref()
                .and_then(as_number)
                .map(|r| r.trunc() as i64)
                .unwrap_or(0),
            duration: self.duration.as_ref().and_then(as_number).unwrap_or(0.0),
            hand,
            device_info: DeviceInfo::from_value(self.device_info.as_ref()),
            scores,
            year: 0,
            month: 0,
            day: 0,
            hour: 0,
            minute: 0,
            second: 0,
        };
        session.derive_calendar_fields();
        Ok(session)
    }
}

/// Trimmed, non-empty text form of a scalar JSON value.
fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Finite number from a JSON number or numeric string.
fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
