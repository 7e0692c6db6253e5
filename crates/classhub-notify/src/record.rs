//! Normalized notification records.
//!
//! Every notification, whatever channel it came through, is coerced into a
//! [`NotificationRecord`] before it reaches the queue. Normalization never
//! fails: missing or mistyped fields fall back to defaults.

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::preferences::Preferences;

/// Type tag used when a payload carries none.
pub const DEFAULT_TYPE: &str = "general";

/// Priority used when a payload carries none.
pub const DEFAULT_PRIORITY: &str = "normal";

/// Length of the random part of a synthesized id.
const ID_SUFFIX_LEN: usize = 9;

/// Channel a record entered the store through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Live stream `notification` event.
    Live,
    /// Polling fallback.
    Polling,
    /// Raised locally by the application (system toasts).
    Local,
}

impl Source {
    /// Return the source as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Polling => "polling",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A notification as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Server-supplied or synthesized identifier.
    pub id: String,
    /// Type tag (grade, attendance, task, error, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Display title.
    pub title: String,
    /// Body text, possibly empty.
    pub message: String,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
    /// Auto-dismiss delay in milliseconds; 0 means manual dismiss only.
    pub duration: u64,
    /// Informational priority tag.
    pub priority: String,
    /// Opaque payload, passed through unmodified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Navigation target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Read flag reported by the server.
    #[serde(default)]
    pub is_read: bool,
    /// Channel the record arrived through.
    pub source: Source,
}

impl NotificationRecord {
    /// Normalize a raw payload.
    ///
    /// A non-object payload is treated as a bare message.
    pub fn normalize(payload: &Value, prefs: &Preferences, source: Source) -> Self {
        let empty = Map::new();
        let (fields, bare_message) = match payload {
            Value::Object(map) => (map, None),
            other => (&empty, coerce_string(other)),
        };

        let kind = fields
            .get("type")
            .and_then(coerce_string)
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| DEFAULT_TYPE.to_string());

        let title = fields
            .get("title")
            .and_then(coerce_string)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_title(&kind).to_string());

        let message = fields
            .get("message")
            .and_then(coerce_string)
            .or(bare_message)
            .unwrap_or_default();

        let duration = fields
            .get("duration")
            .and_then(coerce_duration)
            .unwrap_or_else(|| prefs.duration_for(&kind));

        let data = fields.get("data").filter(|d| !d.is_null()).cloned();
        let link = fields
            .get("link")
            .and_then(Value::as_str)
            .or_else(|| data.as_ref().and_then(|d| d.get("link")).and_then(Value::as_str))
            .filter(|l| !l.is_empty())
            .map(str::to_string);

        Self {
            id: fields
                .get("id")
                .and_then(coerce_id)
                .unwrap_or_else(synthesize_id),
            title,
            message,
            timestamp: fields
                .get("timestamp")
                .and_then(coerce_timestamp)
                .unwrap_or_else(|| Utc::now().timestamp_millis()),
            duration,
            priority: fields
                .get("priority")
                .and_then(coerce_string)
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_PRIORITY.to_string()),
            is_read: is_read_flag(payload),
            data,
            link,
            source,
            kind,
        }
    }

    /// Normalize an item returned by the REST collaborator.
    ///
    /// Server items name the creation time `created_at`.
    pub fn from_server(item: &Value, prefs: &Preferences, source: Source) -> Self {
        let mut payload = item.clone();
        if let Value::Object(map) = &mut payload {
            if !map.contains_key("timestamp") {
                if let Some(created) = map.get("created_at").cloned() {
                    map.insert("timestamp".to_string(), created);
                }
            }
        }
        Self::normalize(&payload, prefs, source)
    }

    /// Whether the record dismisses itself.
    pub fn auto_dismisses(&self) -> bool {
        self.duration > 0
    }

    /// Creation time as a UTC datetime.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Title used when a payload carries none.
pub fn default_title(kind: &str) -> &'static str {
    match kind {
        "grade" => "New Grade",
        "attendance" => "Attendance Update",
        "announcement" => "New Announcement",
        "stream_post" => "New Post",
        "task" => "New Task",
        "success" => "Success",
        "info" => "Information",
        "warning" => "Warning",
        "error" => "Error",
        _ => "Notification",
    }
}

/// `{epoch-ms}-{random lowercase alphanumerics}`.
pub fn synthesize_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// The id a server item carries, if any.
pub fn server_id(item: &Value) -> Option<String> {
    item.get("id").and_then(coerce_id)
}

/// Whether a server item is flagged as already read (`true`, `1`, `"1"`).
pub fn is_read_flag(item: &Value) -> bool {
    match item.get("is_read") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => matches!(s.as_str(), "1" | "true"),
        _ => false,
    }
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn coerce_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn coerce_duration(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|v| v.max(0) as u64))
            .or_else(|| n.as_f64().map(|v| v.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|v| v as i64)),
        Value::String(s) => parse_timestamp(s.trim()),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<i64> {
    if let Ok(ms) = s.parse::<i64>() {
        return Some(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prefs() -> Preferences {
        Preferences::default()
    }

    #[test]
    fn test_defaults_filled_in() {
        let before = Utc::now().timestamp_millis();
        let record = NotificationRecord::normalize(&json!({}), &prefs(), Source::Live);

        assert_eq!(record.kind, "general");
        assert_eq!(record.title, "Notification");
        assert_eq!(record.message, "");
        assert_eq!(record.priority, "normal");
        assert_eq!(record.duration, 6_000);
        assert!(record.timestamp >= before);
        assert!(record.data.is_none());
        assert!(record.link.is_none());
    }

    #[test]
    fn test_title_from_type_map() {
        let record = NotificationRecord::normalize(
            &json!({"type": "grade", "message": "Math: A"}),
            &prefs(),
            Source::Live,
        );
        assert_eq!(record.title, "New Grade");

        let record =
            NotificationRecord::normalize(&json!({"type": "unknown_kind"}), &prefs(), Source::Live);
        assert_eq!(record.title, "Notification");
    }

    #[test]
    fn test_error_type_defaults_to_manual_dismiss() {
        let record = NotificationRecord::normalize(&json!({"type": "error"}), &prefs(), Source::Local);
        assert_eq!(record.duration, 0);
        assert!(!record.auto_dismisses());
    }

    #[test]
    fn test_explicit_duration_wins() {
        let record = NotificationRecord::normalize(
            &json!({"type": "error", "duration": 1500}),
            &prefs(),
            Source::Local,
        );
        assert_eq!(record.duration, 1_500);
    }

    #[test]
    fn test_numeric_id_and_coerced_message() {
        let record = NotificationRecord::normalize(
            &json!({"id": 42, "message": 3.5, "title": ""}),
            &prefs(),
            Source::Polling,
        );
        assert_eq!(record.id, "42");
        assert_eq!(record.message, "3.5");
        assert_eq!(record.title, "Notification");
    }

    #[test]
    fn test_synthesized_id_shape() {
        let record = NotificationRecord::normalize(&json!({"type": "task"}), &prefs(), Source::Live);
        let (millis, suffix) = record.id.split_once('-').unwrap();

        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 9);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(synthesize_id(), synthesize_id());
    }

    #[test]
    fn test_server_item_field_mapping() {
        let item = json!({
            "id": "n-7",
            "type": "stream_post",
            "message": "New post in Biology",
            "created_at": "2024-03-01 08:30:00",
            "data": {"link": "/classrooms/3/stream", "post_id": 9}
        });
        let record = NotificationRecord::from_server(&item, &prefs(), Source::Polling);

        assert_eq!(record.timestamp, 1_709_281_800_000);
        assert_eq!(record.link.as_deref(), Some("/classrooms/3/stream"));
        assert_eq!(record.data.as_ref().unwrap()["post_id"], 9);
        assert_eq!(record.title, "New Post");
    }

    #[test]
    fn test_rfc3339_timestamp() {
        let record = NotificationRecord::normalize(
            &json!({"timestamp": "2024-03-01T08:30:00Z"}),
            &prefs(),
            Source::Live,
        );
        assert_eq!(record.timestamp, 1_709_281_800_000);
    }

    #[test]
    fn test_bare_string_payload_becomes_message() {
        let record = NotificationRecord::normalize(&json!("Saved"), &prefs(), Source::Local);
        assert_eq!(record.message, "Saved");
        assert_eq!(record.kind, "general");
    }

    #[test]
    fn test_is_read_flag_variants() {
        assert!(is_read_flag(&json!({"is_read": true})));
        assert!(is_read_flag(&json!({"is_read": 1})));
        assert!(is_read_flag(&json!({"is_read": "1"})));
        assert!(!is_read_flag(&json!({"is_read": 0})));
        assert!(!is_read_flag(&json!({})));
    }
}
