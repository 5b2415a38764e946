//! Append-only inverted index.
//!
//! Every record contributes one entry per non-empty key. An entry is a JSON
//! line `{"file": "<segment>", "line": <offset>}` appended to
//! `index/<key>/<value>.idx`. Entries are never rewritten or deduplicated.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::types::ParsedRecord;

/// Index keys, in the order they are derived.
pub const INDEX_KEYS: [&str; 8] = [
    "date", "format", "level", "service", "status", "method", "ip", "user",
];

const INDEX_EXT: &str = "idx";

/// One line of an `.idx` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Segment path relative to the storage root.
    pub file: String,
    /// Zero-based offset of the record within the segment.
    pub line: usize,
}

/// Counters for one indexing call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Entries appended.
    pub entries_written: usize,
    /// Entries dropped because their file could not be written.
    pub entries_failed: usize,
}

/// Makes a value safe to use as a file name.
///
/// Path separators, whitespace and `:` become `_`. A value made only of dots
/// gets a leading `_` so it cannot name `.` or `..`.
#[must_use]
pub fn sanitize_value(value: &str) -> String {
    let mut out: String = value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    if !out.is_empty() && out.chars().all(|c| c == '.') {
        out.insert(0, '_');
    }
    out
}

/// Derives the `(key, value)` pairs a record is indexed under. Values are
/// not yet sanitized.
#[must_use]
pub fn derive_keys(record: &ParsedRecord) -> Vec<(&'static str, String)> {
    let mut keys = Vec::with_capacity(INDEX_KEYS.len());
    let mut push = |key: &'static str, value: Option<&str>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            keys.push((key, value.to_string()));
        }
    };

    push("date", record.timestamp.as_deref().and_then(date_prefix));
    push("format", Some(record.format.as_str()));
    let level = record
        .level
        .as_deref()
        .filter(|l| !l.is_empty())
        .or_else(|| record.extra.get("log_type").and_then(|v| v.as_str()));
    push("level", level);
    push("service", record.service.as_deref());
    let status = (record.status_code != 0).then(|| record.status_code.to_string());
    push("status", status.as_deref());
    push("method", record.method.as_deref());
    push("ip", record.source_ip.as_deref());
    push("user", record.user_id.as_deref());

    keys
}

/// Returns the leading `YYYY-MM-DD` of a timestamp if it has that shape.
fn date_prefix(timestamp: &str) -> Option<&str> {
    let prefix = timestamp.get(..10)?;
    let bytes = prefix.as_bytes();
    let shaped = bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    });
    shaped.then_some(prefix)
}

/// Path of the index file for a key and an already-sanitized value.
#[must_use]
pub fn index_file(index_dir: &Path, key: &str, sanitized: &str) -> PathBuf {
    index_dir.join(key).join(format!("{sanitized}.{INDEX_EXT}"))
}

/// Writes index entries for stored segments.
#[derive(Debug, Clone)]
pub struct IndexManager {
    index_dir: PathBuf,
}

impl IndexManager {
    /// Creates a manager writing under `index_dir`.
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
        }
    }

    /// The index directory.
    #[must_use]
    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Indexes every record of a segment.
    ///
    /// `segment` is the path relative to the storage root. Failures on
    /// individual index files are logged and counted; the remaining keys
    /// are still written.
    pub fn index(&self, records: &[ParsedRecord], segment: &Path) -> Result<IndexStats> {
        fs::create_dir_all(&self.index_dir).map_err(|e| StoreError::at(&self.index_dir, e))?;

        let file = segment_reference(segment);
        let mut grouped: BTreeMap<(&'static str, String), Vec<usize>> = BTreeMap::new();
        for (offset, record) in records.iter().enumerate() {
            for (key, value) in derive_keys(record) {
                grouped
                    .entry((key, sanitize_value(&value)))
                    .or_default()
                    .push(offset);
            }
        }

        let mut stats = IndexStats::default();
        for ((key, value), offsets) in grouped {
            let path = index_file(&self.index_dir, key, &value);
            match append_entries(&path, &file, &offsets) {
                Ok(()) => stats.entries_written += offsets.len(),
                Err(e) => {
                    warn!(key, value = %value, path = %path.display(), error = %e, "failed to write index entries");
                    stats.entries_failed += offsets.len();
                }
            }
        }

        debug!(
            segment = %file,
            written = stats.entries_written,
            failed = stats.entries_failed,
            "indexed segment"
        );
        Ok(stats)
    }
}

fn segment_reference(segment: &Path) -> String {
    segment
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn append_entries(path: &Path, file: &str, offsets: &[usize]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::at(parent, e))?;
    }

    let mut buf = Vec::new();
    for &line in offsets {
        let entry = IndexEntry {
            file: file.to_string(),
            line,
        };
        serde_json::to_writer(&mut buf, &entry)?;
        buf.push(b'\n');
    }

    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::at(path, e))?;
    out.write_all(&buf).map_err(|e| StoreError::at(path, e))?;
    Ok(())
}
