//! Format detection and parsing of raw log lines.
//!
//! This module provides:
//! - [`LogParser`]: Classifies a line into a [`LogFormat`] and extracts a [`ParsedRecord`]
//! - One typed extraction function per dialect
//! - Timestamp normalization to RFC3339
//!
//! Parsing is total: a line that matches no dialect comes back as
//! [`LogFormat::Unknown`] with `raw` set, never as an error.

use chrono::{DateTime, NaiveDateTime, SecondsFormat};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::types::{LogFormat, ParsedRecord};

// `[2025-10-24T11:02:52Z] INFO [inventory-service] User logged in`
static APP_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\[(?P<timestamp>[^\]]+)\] (?P<level>\w+) \[(?P<service>[^\]]+)\] (?P<message>.+)$",
    )
    .unwrap_or_else(|_| unreachable!())
});

// `203.0.113.45 - - [24/Oct/2025:11:02:52 +0000] "GET /users HTTP/1.1" 200 1024 "-" "curl/7.68.0"`
static COMBINED_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?P<ip>\S+) \S+ (?P<user>\S+) ",
        r"\[(?P<date>\d{1,2}/\w{3}/\d{4}):(?P<time>\d{2}:\d{2}:\d{2}) (?P<tz>[+-]\d{4})\] ",
        r#""(?P<method>[A-Z]+) (?P<path>\S+) HTTP/(?P<version>[\d.]+)" "#,
        r"(?P<status>\d{3}|-) (?P<size>\d+|-) ",
        r#""(?P<referrer>[^"]*)" "(?P<agent>[^"]*)""#,
    ))
    .unwrap_or_else(|_| unreachable!())
});

// Common log format: the combined pattern without referrer and user agent.
static COMMON_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?P<ip>\S+) \S+ (?P<user>\S+) ",
        r"\[(?P<date>\d{1,2}/\w{3}/\d{4}):(?P<time>\d{2}:\d{2}:\d{2}) (?P<tz>[+-]\d{4})\] ",
        r#""(?P<method>[A-Z]+) (?P<path>\S+) HTTP/(?P<version>[\d.]+)" "#,
        r"(?P<status>\d{3}|-) (?P<size>\d+|-)",
    ))
    .unwrap_or_else(|_| unreachable!())
});

// `2025/10/24 11:02:52 [warn] scheduler: User logged in successfully`
static NGINX_ERROR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<timestamp>\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}) \[(?P<level>\w+)\] (?P<process>[^\s:]+): (?P<message>.+)$",
    )
    .unwrap_or_else(|_| unreachable!())
});

const APACHE_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";
const NGINX_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Detects the dialect of a log line and normalizes it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogParser;

impl LogParser {
    /// Creates a parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classifies a line without extracting fields.
    ///
    /// Order: JSON, app, combined access (apache), simplified web
    /// patterns (nginx), then unknown.
    #[must_use]
    pub fn detect(&self, line: &str) -> LogFormat {
        let line = line.trim();
        if json_object(line).is_some() {
            LogFormat::Json
        } else if APP_PATTERN.is_match(line) {
            LogFormat::App
        } else if COMBINED_PATTERN.is_match(line) {
            LogFormat::Apache
        } else if COMMON_PATTERN.is_match(line) || NGINX_ERROR_PATTERN.is_match(line) {
            LogFormat::Nginx
        } else {
            LogFormat::Unknown
        }
    }

    /// Parses a line into a normalized record. Never fails.
    #[must_use]
    pub fn parse(&self, line: &str) -> ParsedRecord {
        let line = line.trim();

        if let Some(object) = json_object(line) {
            return parse_json(line, object);
        }
        if let Some(caps) = APP_PATTERN.captures(line) {
            return parse_app(&caps);
        }
        if let Some(caps) = COMBINED_PATTERN.captures(line) {
            return parse_access(line, &caps, LogFormat::Apache);
        }
        if let Some(caps) = COMMON_PATTERN.captures(line) {
            return parse_access(line, &caps, LogFormat::Nginx);
        }
        if let Some(caps) = NGINX_ERROR_PATTERN.captures(line) {
            return parse_nginx_error(&caps);
        }

        ParsedRecord::unknown(line)
    }
}

/// Parses a line with a default [`LogParser`].
#[must_use]
pub fn parse_line(line: &str) -> ParsedRecord {
    LogParser::new().parse(line)
}

fn json_object(line: &str) -> Option<Map<String, Value>> {
    if !line.starts_with('{') {
        return None;
    }
    serde_json::from_str::<Map<String, Value>>(line).ok()
}

fn group(caps: &Captures<'_>, name: &str) -> Option<String> {
    caps.name(name)
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty() && *s != "-")
        .map(str::to_string)
}

fn group_str<'a>(caps: &Captures<'a>, name: &str) -> &'a str {
    caps.name(name).map_or("", |m| m.as_str())
}

fn parse_app(caps: &Captures<'_>) -> ParsedRecord {
    let mut record = ParsedRecord::new(LogFormat::App);
    record.timestamp = group(caps, "timestamp").map(|ts| normalize_rfc3339(&ts));
    record.level = group(caps, "level");
    record.service = group(caps, "service");
    record.message = group(caps, "message");
    record
}

fn parse_access(line: &str, caps: &Captures<'_>, format: LogFormat) -> ParsedRecord {
    let mut record = ParsedRecord::new(format);
    record.source_ip = group(caps, "ip");
    record.user = group(caps, "user");
    record.method = group(caps, "method");
    record.path = group(caps, "path");
    record.protocol = group(caps, "version").map(|v| format!("HTTP/{v}"));
    record.status_code = lenient_u16(group_str(caps, "status"));
    record.size = lenient_u64(group_str(caps, "size"));
    record.referrer = group(caps, "referrer");
    record.user_agent = group(caps, "agent");

    let date = group_str(caps, "date");
    let time = group_str(caps, "time");
    if !date.is_empty() && !time.is_empty() {
        record.timestamp = Some(normalize_apache_time(date, time, group_str(caps, "tz")));
    }

    // Access lines carry no message; keep the line for full-text search.
    record.raw = Some(line.to_string());
    record
}

fn parse_nginx_error(caps: &Captures<'_>) -> ParsedRecord {
    let mut record = ParsedRecord::new(LogFormat::Nginx);
    record.timestamp = group(caps, "timestamp").map(|ts| normalize_nginx_time(&ts));
    record.level = group(caps, "level").map(|l| l.to_uppercase());
    record.process = group(caps, "process");
    record.message = group(caps, "message");
    record
}

/// Converts `24/Oct/2025` + `11:02:52` + `+0000` into RFC3339.
///
/// Returns `"date:time tz"` unchanged if it cannot be parsed.
#[must_use]
pub fn normalize_apache_time(date: &str, time: &str, tz: &str) -> String {
    let joined = format!("{date}:{time} {tz}");
    DateTime::parse_from_str(&joined, APACHE_TIME_FORMAT)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or(joined)
}

/// Converts `2025/10/24 11:02:52` (UTC) into RFC3339, or returns it unchanged.
#[must_use]
pub fn normalize_nginx_time(ts: &str) -> String {
    NaiveDateTime::parse_from_str(ts, NGINX_TIME_FORMAT)
        .map(|dt| dt.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|_| ts.to_string())
}

fn normalize_rfc3339(ts: &str) -> String {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .unwrap_or_else(|_| ts.to_string())
}

/// Parses an integer leniently: empty, `-`, or garbage yields zero.
#[must_use]
pub fn lenient_u64(s: &str) -> u64 {
    let s = s.trim();
    if s.is_empty() || s == "-" {
        return 0;
    }
    s.parse().unwrap_or(0)
}

fn lenient_u16(s: &str) -> u16 {
    u16::try_from(lenient_u64(s)).unwrap_or(0)
}

// ============================================================================
// JSON dialect
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Timestamp,
    SourceIp,
    Method,
    Path,
    Protocol,
    StatusCode,
    Size,
    User,
    Referrer,
    UserAgent,
    Message,
    Level,
    Service,
    Process,
    UserId,
    RequestId,
    Duration,
}

/// Resolves an incoming JSON key to a canonical field, through the alias
/// table or by direct name.
fn canonical_field(key: &str) -> Option<Field> {
    let field = match key {
        "timestamp" | "time" | "ts" => Field::Timestamp,
        "source_ip" | "ip" => Field::SourceIp,
        "method" => Field::Method,
        "path" => Field::Path,
        "protocol" => Field::Protocol,
        "status_code" | "status" => Field::StatusCode,
        "size" => Field::Size,
        "user" => Field::User,
        "referrer" => Field::Referrer,
        "user_agent" | "ua" => Field::UserAgent,
        "message" | "msg" => Field::Message,
        "level" | "log_level" | "log_type" | "severity" => Field::Level,
        "service" => Field::Service,
        "process" => Field::Process,
        "user_id" => Field::UserId,
        "request_id" => Field::RequestId,
        "duration" => Field::Duration,
        _ => return None,
    };
    Some(field)
}

fn parse_json(line: &str, object: Map<String, Value>) -> ParsedRecord {
    let mut record = ParsedRecord::new(LogFormat::Json);

    for (key, value) in object {
        let leftover = match canonical_field(&key) {
            Some(field) => assign(&mut record, field, value),
            None => Some(value),
        };
        if let Some(value) = leftover {
            record.extra.insert(key, value);
        }
    }

    if record.message.is_none() {
        record.raw = Some(line.to_string());
    }
    record
}

/// Stores `value` in `field`. Hands the value back when the field is already
/// set, the value is an empty string, or the JSON type does not fit, so the
/// caller can keep it in `extra`.
fn assign(record: &mut ParsedRecord, field: Field, value: Value) -> Option<Value> {
    match field {
        Field::StatusCode => {
            if record.status_code != 0 {
                return Some(value);
            }
            match json_u64(&value).and_then(|n| u16::try_from(n).ok()) {
                Some(n) => record.status_code = n,
                None => return Some(value),
            }
        }
        Field::Size => {
            if record.size != 0 {
                return Some(value);
            }
            match json_u64(&value) {
                Some(n) => record.size = n,
                None => return Some(value),
            }
        }
        Field::Duration => {
            if record.duration.abs() > f64::EPSILON {
                return Some(value);
            }
            match json_f64(&value) {
                Some(n) => record.duration = n,
                None => return Some(value),
            }
        }
        _ => {
            let slot = text_slot(record, field)?;
            if slot.is_some() {
                return Some(value);
            }
            let accepts_numbers = matches!(field, Field::UserId | Field::RequestId);
            match value {
                Value::String(s) if !s.is_empty() => *slot = Some(s),
                Value::Number(n) if accepts_numbers => *slot = Some(n.to_string()),
                other => return Some(other),
            }
        }
    }
    None
}

fn text_slot(record: &mut ParsedRecord, field: Field) -> Option<&mut Option<String>> {
    let slot = match field {
        Field::Timestamp => &mut record.timestamp,
        Field::SourceIp => &mut record.source_ip,
        Field::Method => &mut record.method,
        Field::Path => &mut record.path,
        Field::Protocol => &mut record.protocol,
        Field::User => &mut record.user,
        Field::Referrer => &mut record.referrer,
        Field::UserAgent => &mut record.user_agent,
        Field::Message => &mut record.message,
        Field::Level => &mut record.level,
        Field::Service => &mut record.service,
        Field::Process => &mut record.process,
        Field::UserId => &mut record.user_id,
        Field::RequestId => &mut record.request_id,
        Field::StatusCode | Field::Size | Field::Duration => return None,
    };
    Some(slot)
}

fn json_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) if s.trim().is_empty() || s.trim() == "-" => Some(0),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() || s.trim() == "-" => Some(0.0),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
