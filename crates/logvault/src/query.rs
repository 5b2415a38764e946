//! Read-only queries over a storage root.
//!
//! Two strategies are offered:
//! - [`QueryEngine::find_by_index`]: Point lookup through `index/<key>/<value>.idx`
//! - [`QueryEngine::search_all`]: Case-insensitive regex scan of every segment
//!
//! Neither creates files or directories. Damaged index lines, unreadable
//! segments and references to deleted segments are logged and skipped.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use regex::RegexBuilder;
use tracing::{debug, warn};

use crate::error::QueryError;
use crate::index::{IndexEntry, index_file, sanitize_value};
use crate::ledger::TrackingLedger;
use crate::segment::{ACTIVE_DIR, StorageLayout, list_segments, list_subdirs, read_segment};
use crate::types::ParsedRecord;

/// Read-only view of the on-disk layout.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    layout: StorageLayout,
}

impl QueryEngine {
    /// Creates an engine over the storage root. Nothing is read until a query runs.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: StorageLayout::new(root),
        }
    }

    /// The storage layout being queried.
    #[must_use]
    pub const fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Returns the records indexed under `key = value`.
    ///
    /// Entries whose offset falls outside their segment return the whole
    /// segment. A missing index file returns nothing.
    #[must_use]
    pub fn find_by_index(&self, key: &str, value: &str) -> Vec<ParsedRecord> {
        let path = index_file(
            &self.layout.index_dir(),
            &sanitize_value(key),
            &sanitize_value(value),
        );
        let Ok(contents) = fs::read_to_string(&path) else {
            debug!(key, value, "no index file");
            return Vec::new();
        };

        let mut segments: HashMap<String, Option<Vec<ParsedRecord>>> = HashMap::new();
        let mut results = Vec::new();

        for (n, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: IndexEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %path.display(), line = n + 1, error = %e, "malformed index entry");
                    continue;
                }
            };

            let records = segments
                .entry(entry.file.clone())
                .or_insert_with(|| self.load_referenced(&entry.file));
            let Some(records) = records else {
                continue;
            };

            match records.get(entry.line) {
                Some(record) => results.push(record.clone()),
                None => results.extend(records.iter().cloned()),
            }
        }

        results
    }

    fn load_referenced(&self, file: &str) -> Option<Vec<ParsedRecord>> {
        let path = self.resolve_segment(file)?;
        match read_segment(&path) {
            Ok(records) => Some(records),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable segment");
                None
            }
        }
    }

    /// Finds the segment an index entry points at, following it into the
    /// archive if it has been rotated out of the active directory.
    fn resolve_segment(&self, file: &str) -> Option<PathBuf> {
        let relative = Path::new(file);
        if relative.is_absolute() || relative.components().any(|c| matches!(c, Component::ParentDir)) {
            warn!(file, "index entry points outside the storage root");
            return None;
        }

        let direct = self.layout.resolve(relative);
        if direct.is_file() {
            return Some(direct);
        }

        if !relative.starts_with(ACTIVE_DIR) {
            return None;
        }
        let name = relative.file_name()?;
        let dirs = list_subdirs(&self.layout.archive_dir()).ok()?;
        let found = dirs.into_iter().map(|d| d.join(name)).find(|p| p.is_file());
        if found.is_none() {
            debug!(file, "referenced segment no longer exists");
        }
        found
    }

    /// Returns every record whose searchable text matches `pattern`,
    /// case-insensitively.
    ///
    /// Active segments are scanned first, then each archive directory, all
    /// in name order.
    pub fn search_all(&self, pattern: &str) -> Result<Vec<ParsedRecord>, QueryError> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;

        let mut results = Vec::new();
        for segment in self.all_segments() {
            let records = match read_segment(&segment) {
                Ok(records) => records,
                Err(e) => {
                    warn!(path = %segment.display(), error = %e, "skipping unreadable segment");
                    continue;
                }
            };
            results.extend(
                records
                    .into_iter()
                    .filter(|r| r.searchable_text().is_some_and(|text| regex.is_match(text))),
            );
        }
        Ok(results)
    }

    /// Segment files in scan order: active first, then archive directories.
    #[must_use]
    pub fn all_segments(&self) -> Vec<PathBuf> {
        let mut segments = self.active_segments();
        for dir in self.archive_dirs() {
            segments.extend(list_or_warn(&dir, list_segments));
        }
        segments
    }

    fn active_segments(&self) -> Vec<PathBuf> {
        list_or_warn(&self.layout.active_dir(), list_segments)
    }

    fn archive_dirs(&self) -> Vec<PathBuf> {
        list_or_warn(&self.layout.archive_dir(), list_subdirs)
    }

    /// Lists the available index keys, sorted.
    pub fn index_types(&self) -> Result<Vec<String>, QueryError> {
        let index_dir = self.layout.index_dir();
        if !index_dir.is_dir() {
            return Err(QueryError::NoIndexes(index_dir));
        }
        let mut types: Vec<String> = list_or_warn(&index_dir, list_subdirs)
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
            .collect();
        types.sort();
        Ok(types)
    }

    /// Summarizes what is stored under the root.
    #[must_use]
    pub fn summary(&self) -> StorageSummary {
        let archive_dirs = self.archive_dirs();
        let archived_segments = archive_dirs
            .iter()
            .map(|d| list_or_warn(d, list_segments).len())
            .sum();

        StorageSummary {
            root: self.layout.root().to_path_buf(),
            processed_files: TrackingLedger::load(self.layout.tracking_file()).len(),
            active_segments: self.active_segments().len(),
            archive_dirs: archive_dirs.len(),
            archived_segments,
            index_types: self.index_types().unwrap_or_default(),
        }
    }
}

/// Counts describing a storage root.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StorageSummary {
    /// The storage root.
    pub root: PathBuf,
    /// Entries in the tracking ledger.
    pub processed_files: usize,
    /// Segments waiting in `active/`.
    pub active_segments: usize,
    /// Rotation directories in `archive/`.
    pub archive_dirs: usize,
    /// Segments across all rotation directories.
    pub archived_segments: usize,
    /// Available index keys.
    pub index_types: Vec<String>,
}

fn list_or_warn(
    dir: &Path,
    list: fn(&Path) -> crate::error::Result<Vec<PathBuf>>,
) -> Vec<PathBuf> {
    list(dir).unwrap_or_else(|e| {
        warn!(dir = %dir.display(), error = %e, "cannot list directory");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexManager;
    use crate::segment::write_segment;
    use crate::types::LogFormat;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tempfile::TempDir;

    fn record(service: &str, message: &str) -> ParsedRecord {
        let mut r = ParsedRecord::new(LogFormat::App);
        r.service = Some(service.to_string());
        r.message = Some(message.to_string());
        r
    }

    fn store(layout: &StorageLayout, records: &[ParsedRecord], secs: u64) -> PathBuf {
        let rel = write_segment(layout, records, UNIX_EPOCH + Duration::from_secs(secs)).expect("write");
        IndexManager::new(layout.index_dir()).index(records, &rel).expect("index");
        rel
    }

    #[test]
    fn point_lookup_returns_exact_records() {
        let dir = TempDir::new().expect("tempdir");
        let layout = StorageLayout::new(dir.path());
        store(&layout, &[record("api", "one"), record("billing", "two"), record("api", "three")], 1);

        let engine = QueryEngine::new(dir.path());
        let found = engine.find_by_index("service", "api");
        let messages: Vec<_> = found.iter().filter_map(|r| r.message.as_deref()).collect();
        assert_eq!(messages, vec!["one", "three"]);
    }

    #[test]
    fn lookup_sanitizes_value() {
        let dir = TempDir::new().expect("tempdir");
        let layout = StorageLayout::new(dir.path());
        store(&layout, &[record("svc/a b", "x")], 1);

        let found = QueryEngine::new(dir.path()).find_by_index("service", "svc/a b");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn missing_index_is_empty() {
        let dir = TempDir::new().expect("tempdir");
        assert!(QueryEngine::new(dir.path()).find_by_index("service", "nope").is_empty());
        assert!(!dir.path().join("index").exists());
    }

    #[test]
    fn out_of_range_offset_returns_whole_segment() {
        let dir = TempDir::new().expect("tempdir");
        let layout = StorageLayout::new(dir.path());
        let rel = write_segment(&layout, &[record("a", "1"), record("b", "2")], UNIX_EPOCH).expect("write");
        let idx = index_file(&layout.index_dir(), "service", "ghost");
        fs::create_dir_all(idx.parent().expect("parent")).expect("mkdir");
        let entry = IndexEntry { file: rel.to_string_lossy().into_owned(), line: 99 };
        fs::write(&idx, format!("{}\n", serde_json::to_string(&entry).expect("json"))).expect("write");

        let found = QueryEngine::new(dir.path()).find_by_index("service", "ghost");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn malformed_lines_and_dangling_refs_are_skipped() {
        let dir = TempDir::new().expect("tempdir");
        let layout = StorageLayout::new(dir.path());
        let rel = write_segment(&layout, &[record("a", "kept")], UNIX_EPOCH).expect("write");
        let idx = index_file(&layout.index_dir(), "service", "a");
        fs::create_dir_all(idx.parent().expect("parent")).expect("mkdir");
        let contents = format!(
            "not json\n{{\"file\":\"active/logs_404.json\",\"line\":0}}\n{{\"file\":\"../escape.json\",\"line\":0}}\n{{\"file\":\"{}\",\"line\":0}}\n",
            rel.to_string_lossy()
        );
        fs::write(&idx, contents).expect("write");

        let found = QueryEngine::new(dir.path()).find_by_index("service", "a");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message.as_deref(), Some("kept"));
    }

    #[test]
    fn lookup_follows_rotated_segment() {
        let dir = TempDir::new().expect("tempdir");
        let layout = StorageLayout::new(dir.path());
        store(&layout, &[record("api", "before rotation")], 1);
        crate::rotation::rotate_active(&layout, UNIX_EPOCH + Duration::from_secs(2)).expect("rotate");

        let found = QueryEngine::new(dir.path()).find_by_index("service", "api");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message.as_deref(), Some("before rotation"));
    }

    #[test]
    fn search_is_case_insensitive_over_raw_then_message() {
        let dir = TempDir::new().expect("tempdir");
        let layout = StorageLayout::new(dir.path());
        let mut with_raw = ParsedRecord::unknown("GET /health");
        with_raw.message = Some("unrelated".to_string());
        store(&layout, &[with_raw, record("api", "Payment failed"), record("api", "ok")], 1);

        let engine = QueryEngine::new(dir.path());
        assert_eq!(engine.search_all("get").expect("search").len(), 1);
        assert_eq!(engine.search_all("PAYMENT").expect("search").len(), 1);
        assert!(engine.search_all("unrelated").expect("search").is_empty());
    }

    #[test]
    fn search_scans_active_then_archive() {
        let dir = TempDir::new().expect("tempdir");
        let layout = StorageLayout::new(dir.path());
        store(&layout, &[record("api", "hit archived")], 1);
        crate::rotation::rotate_active(&layout, UNIX_EPOCH + Duration::from_secs(2)).expect("rotate");
        store(&layout, &[record("api", "hit active")], 3);

        let found = QueryEngine::new(dir.path()).search_all("hit").expect("search");
        let messages: Vec<_> = found.iter().filter_map(|r| r.message.as_deref()).collect();
        assert_eq!(messages, vec!["hit active", "hit archived"]);
    }

    #[test]
    fn search_skips_corrupt_segments() {
        let dir = TempDir::new().expect("tempdir");
        let layout = StorageLayout::new(dir.path());
        store(&layout, &[record("api", "needle")], 1);
        fs::write(layout.active_dir().join("logs_0.json"), "garbage").expect("write");

        let found = QueryEngine::new(dir.path()).search_all("needle").expect("search");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let err = QueryEngine::new(dir.path()).search_all("(unclosed").expect_err("invalid");
        assert!(matches!(err, QueryError::InvalidPattern(_)));
    }

    #[test]
    fn index_types_requires_index_dir() {
        let dir = TempDir::new().expect("tempdir");
        let engine = QueryEngine::new(dir.path());
        assert!(matches!(engine.index_types(), Err(QueryError::NoIndexes(_))));

        let layout = StorageLayout::new(dir.path());
        store(&layout, &[record("api", "x")], 1);
        assert_eq!(engine.index_types().expect("types"), vec!["format", "service"]);
    }

    #[test]
    fn summary_counts_layout() {
        let dir = TempDir::new().expect("tempdir");
        let layout = StorageLayout::new(dir.path());
        store(&layout, &[record("api", "a")], 1);
        crate::rotation::rotate_active(&layout, SystemTime::UNIX_EPOCH + Duration::from_secs(2)).expect("rotate");
        store(&layout, &[record("api", "b")], 3);

        let summary = QueryEngine::new(dir.path()).summary();
        assert_eq!(summary.active_segments, 1);
        assert_eq!(summary.archive_dirs, 1);
        assert_eq!(summary.archived_segments, 1);
        assert_eq!(summary.processed_files, 0);
        assert_eq!(summary.index_types, vec!["format", "service"]);
    }
}
