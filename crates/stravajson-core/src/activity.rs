//! Activity records as returned by the Strava API.
//!
//! The provider returns activities as loosely typed JSON objects with dozens
//! of fields. [`Activity`] keeps the whole object untouched so that writing it
//! back out is lossless, and exposes typed accessors for the handful of fields
//! this tool actually inspects (`id`, `type`, `distance`, `moving_time`,
//! `start_date_local`, `start_date`).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Activity type used by the run-only filter.
pub const RUN_TYPE: &str = "Run";

/// Identifier of an activity, used as the deduplication key.
///
/// Any JSON scalar is accepted. Identifiers compare by their canonical JSON
/// text, so the number `1` and the string `"1"` are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivityId(String);

impl ActivityId {
    /// Builds an identifier from a JSON value.
    ///
    /// Returns `None` for `null`, arrays and objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null | Value::Array(_) | Value::Object(_) => None,
            scalar => Some(Self(scalar.to_string())),
        }
    }

    /// Returns the canonical JSON text of the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single activity record.
///
/// Serializes exactly as it was deserialized: unknown fields, `null`s and
/// numeric representations all pass through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Activity {
    fields: Map<String, Value>,
}

impl Activity {
    /// Wraps a JSON object.
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Converts an arbitrary JSON value, returning `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// The activity identifier, if present and scalar.
    pub fn id(&self) -> Option<ActivityId> {
        self.fields.get("id").and_then(ActivityId::from_value)
    }

    /// The activity type (`"Run"`, `"Ride"`, ...).
    pub fn activity_type(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    /// Returns true if this activity is a run.
    pub fn is_run(&self) -> bool {
        self.activity_type() == Some(RUN_TYPE)
    }

    /// Distance in meters; missing or non-numeric values count as zero.
    pub fn distance_m(&self) -> f64 {
        self.number("distance")
    }

    /// Moving time in seconds; missing or non-numeric values count as zero.
    pub fn moving_time_s(&self) -> f64 {
        self.number("moving_time")
    }

    /// Local start timestamp as sent by the provider.
    pub fn start_date_local(&self) -> Option<&str> {
        self.non_empty_str("start_date_local")
    }

    /// UTC start timestamp as sent by the provider.
    pub fn start_date(&self) -> Option<&str> {
        self.non_empty_str("start_date")
    }

    /// The local start timestamp if present, else the UTC one, else `""`.
    pub fn effective_start_date(&self) -> &str {
        self.start_date_local()
            .or_else(|| self.start_date())
            .unwrap_or("")
    }

    /// The `YYYY-MM-DD` prefix of the effective start date, if any.
    pub fn effective_start_day(&self) -> Option<&str> {
        let date = self.effective_start_date();
        date.get(..10).filter(|day| !day.is_empty())
    }

    /// Read access to the raw JSON fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consumes the activity and returns the raw JSON object.
    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    fn number(&self, key: &str) -> f64 {
        self.fields.get(key).and_then(Value::as_f64).unwrap_or(0.0)
    }

    fn non_empty_str(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

impl From<Map<String, Value>> for Activity {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_map(fields)
    }
}
