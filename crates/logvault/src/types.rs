//! Core record types shared by the parser, storage engine, index and query engine.
//!
//! This module provides:
//! - [`LogFormat`]: The dialect a line was recognized as
//! - [`ParsedRecord`]: The normalized record persisted in segments
//! - [`RawLine`]: An unparsed line tagged with its source

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The log dialect a line was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Combined web access log with referrer and user agent.
    Apache,
    /// Simplified web access line or nginx error line.
    Nginx,
    /// Application bracket format: `[ts] LEVEL [service] message`.
    App,
    /// A JSON object.
    Json,
    /// Anything not recognized; `raw` carries the original text.
    #[default]
    Unknown,
}

impl LogFormat {
    /// Returns the lowercase name used on disk and in the index.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Apache => "apache",
            Self::Nginx => "nginx",
            Self::App => "app",
            Self::Json => "json",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized log record.
///
/// Every field except `format` is optional. Text fields are `None` when the
/// dialect did not supply them; numeric fields are zero. Empty values are
/// omitted from the serialized form so segments stay compact.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedRecord {
    /// Detected dialect.
    pub format: LogFormat,
    /// Normalized RFC3339 timestamp, or the verbatim source text if it
    /// could not be normalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Client address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    /// HTTP method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Protocol, e.g. `HTTP/1.1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// HTTP status code (0 when absent).
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub status_code: u16,
    /// Response size in bytes (0 when absent).
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub size: u64,
    /// Authenticated user from an access line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// HTTP referrer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    /// HTTP user agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Severity as written by the source.
    #[serde(default, alias = "log_level", skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Emitting service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Emitting process (nginx error lines).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    /// Application user identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Request correlation identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Request duration as reported by the source (0 when absent).
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub duration: f64,
    /// Original line, kept when the dialect produced no message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Base name of the input file the record was ingested from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// Attributes with no canonical field.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ParsedRecord {
    /// Creates an empty record of the given format.
    #[must_use]
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// Creates an `unknown` record that preserves the original line.
    #[must_use]
    pub fn unknown(line: &str) -> Self {
        Self {
            raw: Some(line.to_string()),
            ..Self::new(LogFormat::Unknown)
        }
    }

    /// Returns the text the full-text scan matches against: `raw` when it is
    /// non-empty, otherwise `message`.
    #[must_use]
    pub fn searchable_text(&self) -> Option<&str> {
        match self.raw.as_deref() {
            Some(raw) if !raw.is_empty() => Some(raw),
            _ => self.message.as_deref(),
        }
    }

    /// Sets the originating input file.
    #[must_use]
    pub fn with_source_file(mut self, source: impl Into<String>) -> Self {
        self.source_file = Some(source.into());
        self
    }
}

/// An unparsed line and the name of the source it arrived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Source identifier (file name, socket peer, channel name).
    pub source: String,
    /// Line content without the trailing newline.
    pub text: String,
}

impl RawLine {
    /// Creates a raw line.
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero_u16(v: &u16) -> bool {
    *v == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_f64(v: &f64) -> bool {
    v.abs() < f64::EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_serializes_lowercase() {
        let json = serde_json::to_string(&LogFormat::Apache).expect("serialize");
        assert_eq!(json, "\"apache\"");

        let parsed: LogFormat = serde_json::from_str("\"nginx\"").expect("deserialize");
        assert_eq!(parsed, LogFormat::Nginx);
    }

    #[test]
    fn format_display_matches_as_str() {
        for format in [
            LogFormat::Apache,
            LogFormat::Nginx,
            LogFormat::App,
            LogFormat::Json,
            LogFormat::Unknown,
        ] {
            assert_eq!(format.to_string(), format.as_str());
        }
    }

    #[test]
    fn record_omits_empty_fields() {
        let record = ParsedRecord::new(LogFormat::App);
        let json = serde_json::to_string(&record).expect("serialize");
        assert_eq!(json, r#"{"format":"app"}"#);
    }

    #[test]
    fn record_always_serializes_format() {
        let record = ParsedRecord::unknown("garbage");
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["format"], "unknown");
        assert_eq!(value["raw"], "garbage");
    }

    #[test]
    fn record_accepts_log_level_alias() {
        let record: ParsedRecord =
            serde_json::from_str(r#"{"format":"nginx","log_level":"WARN"}"#).expect("deserialize");
        assert_eq!(record.level.as_deref(), Some("WARN"));
    }

    #[test]
    fn record_missing_format_defaults_to_unknown() {
        let record: ParsedRecord = serde_json::from_str(r#"{"message":"hi"}"#).expect("deserialize");
        assert_eq!(record.format, LogFormat::Unknown);
    }

    #[test]
    fn searchable_text_prefers_raw() {
        let mut record = ParsedRecord::unknown("raw line");
        record.message = Some("message".to_string());
        assert_eq!(record.searchable_text(), Some("raw line"));

        record.raw = Some(String::new());
        assert_eq!(record.searchable_text(), Some("message"));

        record.raw = None;
        record.message = None;
        assert_eq!(record.searchable_text(), None);
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut record = ParsedRecord::new(LogFormat::Apache);
        record.status_code = 404;
        record.size = 12;
        record.duration = 1.5;
        record.extra.insert("region".to_string(), serde_json::json!("eu"));

        let json = serde_json::to_string(&record).expect("serialize");
        let back: ParsedRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, record);
    }
}
