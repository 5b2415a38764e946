//! Retention: pruning archived segments by count or age.
//!
//! Candidates are selected with a [`FilePattern`], a small glob supporting
//! `*` and `?` within a path component and `/` between components. The
//! default pattern, relative to `archive/`, is [`DEFAULT_PATTERN`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};

/// Default retention pattern, relative to the archive directory.
pub const DEFAULT_PATTERN: &str = "rotated_*/logs_*.json";

/// A compiled glob matched one path component at a time.
#[derive(Debug, Clone)]
pub struct FilePattern {
    source: String,
    components: Vec<Regex>,
}

impl FilePattern {
    /// Compiles a pattern such as `rotated_*/logs_*.json`.
    pub fn new(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| StoreError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.trim().is_empty() {
            return Err(invalid("pattern is empty"));
        }

        let mut components = Vec::new();
        for part in pattern.split('/') {
            if part.is_empty() {
                return Err(invalid("empty path component"));
            }
            if part == "." || part == ".." {
                return Err(invalid("relative components are not allowed"));
            }
            let regex = Regex::new(&component_regex(part)).map_err(|e| invalid(&e.to_string()))?;
            components.push(regex);
        }

        Ok(Self {
            source: pattern.to_string(),
            components,
        })
    }

    /// The pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns files under `base` matching the pattern, sorted by path.
    pub fn matches(&self, base: &Path) -> Result<Vec<PathBuf>> {
        let mut frontier = vec![base.to_path_buf()];
        let last = self.components.len().saturating_sub(1);

        for (depth, component) in self.components.iter().enumerate() {
            let mut next = Vec::new();
            for dir in &frontier {
                let entries = match fs::read_dir(dir) {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(StoreError::at(dir, e)),
                };
                for entry in entries {
                    let entry = entry.map_err(|e| StoreError::at(dir, e))?;
                    let name = entry.file_name();
                    let Some(name) = name.to_str() else {
                        continue;
                    };
                    if !component.is_match(name) {
                        continue;
                    }
                    let path = entry.path();
                    let wanted = if depth == last { path.is_file() } else { path.is_dir() };
                    if wanted {
                        next.push(path);
                    }
                }
            }
            frontier = next;
        }

        frontier.sort();
        Ok(frontier)
    }
}

impl Default for FilePattern {
    fn default() -> Self {
        Self {
            source: DEFAULT_PATTERN.to_string(),
            components: DEFAULT_PATTERN
                .split('/')
                .map(|part| Regex::new(&component_regex(part)).unwrap_or_else(|_| unreachable!()))
                .collect(),
        }
    }
}

fn component_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}

/// What a retention pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetentionReport {
    /// Files that matched the pattern.
    pub matched: usize,
    /// Files removed.
    pub deleted: Vec<PathBuf>,
    /// Files that could not be removed, with the error text.
    pub failed: Vec<(PathBuf, String)>,
}

/// Decides which archived files to delete.
pub trait RetentionPolicy: Send + Sync {
    /// Deletes matching files under `base` that the policy no longer keeps.
    fn apply(&self, base: &Path, pattern: &FilePattern, now: SystemTime) -> RetentionReport;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Keeps the newest `max_files` matches.
#[derive(Debug, Clone, Copy)]
pub struct CountRetention {
    max_files: usize,
}

impl CountRetention {
    /// Keeps at most `max_files` files.
    #[must_use]
    pub const fn new(max_files: usize) -> Self {
        Self { max_files }
    }
}

impl RetentionPolicy for CountRetention {
    fn apply(&self, base: &Path, pattern: &FilePattern, _now: SystemTime) -> RetentionReport {
        let mut candidates = match collect_with_mtime(base, pattern) {
            Ok(candidates) => candidates,
            Err(e) => return failed_scan(base, &e),
        };
        let mut report = RetentionReport {
            matched: candidates.len(),
            ..RetentionReport::default()
        };
        if candidates.len() <= self.max_files {
            return report;
        }

        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let excess = candidates.len() - self.max_files;
        for (path, _) in candidates.into_iter().take(excess) {
            delete(&path, &mut report);
        }
        report
    }

    fn name(&self) -> &'static str {
        "count"
    }
}

/// Deletes matches older than a threshold.
#[derive(Debug, Clone, Copy)]
pub struct AgeRetention {
    max_age_secs: u64,
}

impl AgeRetention {
    /// Threshold in seconds.
    #[must_use]
    pub const fn new(max_age_secs: u64) -> Self {
        Self { max_age_secs }
    }

    /// Threshold in days.
    #[must_use]
    pub const fn from_days(days: u64) -> Self {
        Self::new(days.saturating_mul(24 * 3600))
    }
}

impl RetentionPolicy for AgeRetention {
    fn apply(&self, base: &Path, pattern: &FilePattern, now: SystemTime) -> RetentionReport {
        let candidates = match collect_with_mtime(base, pattern) {
            Ok(candidates) => candidates,
            Err(e) => return failed_scan(base, &e),
        };
        let mut report = RetentionReport {
            matched: candidates.len(),
            ..RetentionReport::default()
        };

        let threshold = Duration::from_secs(self.max_age_secs);
        for (path, modified) in candidates {
            let expired = now.duration_since(modified).is_ok_and(|age| age > threshold);
            if expired {
                delete(&path, &mut report);
            }
        }
        report
    }

    fn name(&self) -> &'static str {
        "age"
    }
}

fn collect_with_mtime(base: &Path, pattern: &FilePattern) -> Result<Vec<(PathBuf, SystemTime)>> {
    let mut out = Vec::new();
    for path in pattern.matches(base)? {
        match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => out.push((path, modified)),
            Err(e) => warn!(path = %path.display(), error = %e, "cannot read mtime, skipping"),
        }
    }
    Ok(out)
}

fn failed_scan(base: &Path, error: &StoreError) -> RetentionReport {
    warn!(base = %base.display(), error = %error, "retention scan failed");
    RetentionReport::default()
}

fn delete(path: &Path, report: &mut RetentionReport) {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "retention removed file");
            report.deleted.push(path.to_path_buf());
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "retention failed to remove file");
            report.failed.push((path.to_path_buf(), e.to_string()));
        }
    }
}

/// Removes empty subdirectories of `archive`. Returns how many were removed.
pub fn remove_empty_dirs(archive: &Path) -> usize {
    let Ok(entries) = fs::read_dir(archive) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let is_empty = fs::read_dir(&path).is_ok_and(|mut it| it.next().is_none());
        if is_empty && fs::remove_dir(&path).is_ok() {
            removed += 1;
        }
    }
    if removed > 0 {
        info!(archive = %archive.display(), removed, "removed empty rotation directories");
    }
    removed
}
