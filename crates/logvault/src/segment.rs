//! Storage layout and segment files.
//!
//! A storage root looks like this:
//!
//! ```text
//! <root>/
//!   storage_tracking.json
//!   active/logs_<unix>.json
//!   archive/rotated_<unix>/logs_<unix>.json
//!   index/<key>/<value>.idx
//! ```
//!
//! A segment is a pretty-printed JSON array of [`ParsedRecord`]s and is
//! immutable once written.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::types::ParsedRecord;

/// Directory holding segments that have not been rotated yet.
pub const ACTIVE_DIR: &str = "active";
/// Directory holding one subdirectory per rotation.
pub const ARCHIVE_DIR: &str = "archive";
/// Directory holding the inverted index.
pub const INDEX_DIR: &str = "index";
/// File listing inputs that have already been ingested.
pub const TRACKING_FILE: &str = "storage_tracking.json";

const SEGMENT_PREFIX: &str = "logs_";
const SEGMENT_EXT: &str = "json";

/// Paths inside a storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Creates a layout rooted at `root`. Nothing is touched on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/active`.
    #[must_use]
    pub fn active_dir(&self) -> PathBuf {
        self.root.join(ACTIVE_DIR)
    }

    /// `<root>/archive`.
    #[must_use]
    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    /// `<root>/index`.
    #[must_use]
    pub fn index_dir(&self) -> PathBuf {
        self.root.join(INDEX_DIR)
    }

    /// `<root>/storage_tracking.json`.
    #[must_use]
    pub fn tracking_file(&self) -> PathBuf {
        self.root.join(TRACKING_FILE)
    }

    /// Creates the root and its `active`, `archive` and `index` directories.
    pub fn ensure(&self) -> Result<()> {
        for dir in [self.active_dir(), self.archive_dir(), self.index_dir()] {
            fs::create_dir_all(&dir).map_err(|e| StoreError::at(&dir, e))?;
        }
        Ok(())
    }

    /// Resolves a path relative to the root.
    #[must_use]
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}

/// Seconds since the Unix epoch, clamped to zero for times before it.
#[must_use]
pub fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

/// Returns the first `<stem>` or `<stem>_<n><ext>` path that does not exist
/// in `dir`. `ext` includes the leading dot or is empty.
pub(crate) fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    dir.join(unique_name(stem, ext, |name| dir.join(name).exists()))
}

/// Returns the first of `<stem><ext>`, `<stem>_1<ext>`, ... for which
/// `taken` is false.
fn unique_name(stem: &str, ext: &str, taken: impl Fn(&str) -> bool) -> String {
    let first = format!("{stem}{ext}");
    if !taken(&first) {
        return first;
    }
    let mut n: u32 = 1;
    loop {
        let candidate = format!("{stem}_{n}{ext}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Serializes `value` as pretty JSON into `path` through a sibling temp file
/// and a rename.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("segment");
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    fs::write(&tmp, bytes).map_err(|e| StoreError::at(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::at(path, e));
    }
    Ok(())
}

/// Writes `records` as a new segment in the active directory.
///
/// The file name is unique across `active/` and every rotation directory,
/// so an index entry's `active/<name>` keeps identifying this segment after
/// it is rotated. Returns the segment path relative to the storage root,
/// e.g. `active/logs_1729767772.json`.
pub fn write_segment(
    layout: &StorageLayout,
    records: &[ParsedRecord],
    now: SystemTime,
) -> Result<PathBuf> {
    if records.is_empty() {
        return Err(StoreError::EmptyBatch);
    }

    let active = layout.active_dir();
    fs::create_dir_all(&active).map_err(|e| StoreError::at(&active, e))?;

    let rotations = list_subdirs(&layout.archive_dir())?;
    let stem = format!("{SEGMENT_PREFIX}{}", unix_seconds(now));
    let name = unique_name(&stem, &format!(".{SEGMENT_EXT}"), |name| {
        active.join(name).exists() || rotations.iter().any(|dir| dir.join(name).exists())
    });
    write_json_atomic(&active.join(&name), records)?;

    Ok(Path::new(ACTIVE_DIR).join(name))
}

/// Reads every record of a segment.
pub fn read_segment(path: &Path) -> Result<Vec<ParsedRecord>> {
    let bytes = fs::read(path).map_err(|e| StoreError::at(path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Returns `true` for file names that look like segments (`*.json`, not temp files).
#[must_use]
pub fn is_segment_name(name: &str) -> bool {
    !name.starts_with('.')
        && Path::new(name)
            .extension()
            .is_some_and(|ext| ext == SEGMENT_EXT)
}

/// Lists segment files directly inside `dir`, sorted by name.
///
/// A missing directory yields an empty list.
pub fn list_segments(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut segments: Vec<PathBuf> = list_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file())
        .filter(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(is_segment_name))
        .collect();
    segments.sort();
    Ok(segments)
}

/// Lists the subdirectories of `dir`, sorted by name.
///
/// A missing directory yields an empty list.
pub fn list_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = list_entries(dir)?
        .into_iter()
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn list_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::at(dir, e)),
    };
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::at(dir, e))?;
        paths.push(entry.path());
    }
    Ok(paths)
}
