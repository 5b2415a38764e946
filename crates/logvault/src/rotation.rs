//! Rotation of the active directory into the archive.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use crate::error::{Result, StoreError};
use crate::segment::{StorageLayout, unique_path, unix_seconds};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Size and age summary of the files in the active directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveDirStats {
    /// Number of non-directory entries.
    pub file_count: usize,
    /// Sum of their sizes in bytes.
    pub total_bytes: u64,
    /// Modification time of the oldest file.
    pub oldest_modified: Option<SystemTime>,
}

impl ActiveDirStats {
    /// Scans `dir`. A missing directory counts as empty.
    pub fn collect(dir: &Path) -> Result<Self> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(StoreError::at(dir, e)),
        };

        let mut stats = Self::default();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::at(dir, e))?;
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "cannot stat active file");
                    continue;
                }
            };
            if meta.is_dir() {
                continue;
            }
            stats.file_count += 1;
            stats.total_bytes += meta.len();
            if let Ok(modified) = meta.modified() {
                stats.oldest_modified = Some(match stats.oldest_modified {
                    Some(oldest) if oldest <= modified => oldest,
                    _ => modified,
                });
            }
        }
        Ok(stats)
    }

    /// Returns `true` if the directory holds no files.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.file_count == 0
    }
}

/// Decides when the active directory should be rotated.
pub trait RotationPolicy: Send + Sync {
    /// Returns `true` if a rotation should happen now.
    fn should_rotate(&self, stats: &ActiveDirStats, now: SystemTime) -> bool;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Rotates once the active directory reaches a size threshold.
#[derive(Debug, Clone, Copy)]
pub struct SizeRotation {
    threshold_bytes: u64,
}

impl SizeRotation {
    /// Threshold in megabytes.
    #[must_use]
    pub const fn new(megabytes: u64) -> Self {
        Self::from_bytes(megabytes.saturating_mul(BYTES_PER_MB))
    }

    /// Threshold in bytes.
    #[must_use]
    pub const fn from_bytes(threshold_bytes: u64) -> Self {
        Self { threshold_bytes }
    }

    /// Configured threshold in bytes.
    #[must_use]
    pub const fn threshold_bytes(&self) -> u64 {
        self.threshold_bytes
    }
}

impl RotationPolicy for SizeRotation {
    fn should_rotate(&self, stats: &ActiveDirStats, _now: SystemTime) -> bool {
        !stats.is_empty() && stats.total_bytes >= self.threshold_bytes
    }

    fn name(&self) -> &'static str {
        "size"
    }
}

/// Rotates once the oldest active file is older than `max_age`.
#[derive(Debug, Clone, Copy)]
pub struct TimeRotation {
    max_age: Duration,
}

impl TimeRotation {
    /// Maximum age of the oldest active file.
    #[must_use]
    pub const fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    /// Maximum age in hours.
    #[must_use]
    pub const fn from_hours(hours: u64) -> Self {
        Self::new(Duration::from_secs(hours.saturating_mul(3600)))
    }
}

impl RotationPolicy for TimeRotation {
    fn should_rotate(&self, stats: &ActiveDirStats, now: SystemTime) -> bool {
        let Some(oldest) = stats.oldest_modified else {
            return false;
        };
        now.duration_since(oldest)
            .is_ok_and(|age| age > self.max_age)
    }

    fn name(&self) -> &'static str {
        "time"
    }
}

/// Fires when any member policy fires, checked in order.
#[derive(Default)]
pub struct AnyRotation {
    policies: Vec<Box<dyn RotationPolicy>>,
}

impl AnyRotation {
    /// Creates an empty combination that never fires.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a policy.
    #[must_use]
    pub fn with(mut self, policy: impl RotationPolicy + 'static) -> Self {
        self.policies.push(Box::new(policy));
        self
    }

    /// Returns the first member that fires.
    pub fn triggered_by(&self, stats: &ActiveDirStats, now: SystemTime) -> Option<&'static str> {
        self.policies
            .iter()
            .find(|p| p.should_rotate(stats, now))
            .map(|p| p.name())
    }
}

impl RotationPolicy for AnyRotation {
    fn should_rotate(&self, stats: &ActiveDirStats, now: SystemTime) -> bool {
        self.triggered_by(stats, now).is_some()
    }

    fn name(&self) -> &'static str {
        "any"
    }
}

impl std::fmt::Debug for AnyRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.policies.iter().map(|p| p.name()).collect();
        f.debug_struct("AnyRotation").field("policies", &names).finish()
    }
}

/// Result of moving the active directory into the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    /// The new `archive/rotated_<unix>` directory.
    pub archive_dir: PathBuf,
    /// Number of files moved.
    pub moved: usize,
}

/// Moves every file in the active directory into a fresh archive directory.
///
/// Files that cannot be renamed are logged and left in place.
pub fn rotate_active(layout: &StorageLayout, now: SystemTime) -> Result<RotationOutcome> {
    let archive = layout.archive_dir();
    fs::create_dir_all(&archive).map_err(|e| StoreError::at(&archive, e))?;

    let target = unique_path(&archive, &format!("rotated_{}", unix_seconds(now)), "");
    fs::create_dir(&target).map_err(|e| StoreError::at(&target, e))?;

    let active = layout.active_dir();
    let entries = match fs::read_dir(&active) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(RotationOutcome {
                archive_dir: target,
                moved: 0,
            });
        }
        Err(e) => return Err(StoreError::at(&active, e)),
    };

    let mut moved = 0;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::at(&active, e))?;
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let dest = target.join(entry.file_name());
        match fs::rename(&path, &dest) {
            Ok(()) => moved += 1,
            Err(e) => warn!(
                from = %path.display(),
                to = %dest.display(),
                error = %e,
                "failed to move file during rotation"
            ),
        }
    }

    info!(archive = %target.display(), moved, "rotated active segments");
    Ok(RotationOutcome {
        archive_dir: target,
        moved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stats(bytes: u64, oldest: Option<SystemTime>) -> ActiveDirStats {
        ActiveDirStats {
            file_count: usize::from(bytes > 0 || oldest.is_some()),
            total_bytes: bytes,
            oldest_modified: oldest,
        }
    }

    #[test]
    fn size_rotation_threshold() {
        let policy = SizeRotation::from_bytes(100);
        let now = SystemTime::now();

        assert!(!policy.should_rotate(&stats(99, None), now));
        assert!(policy.should_rotate(&stats(100, None), now));
        assert!(policy.should_rotate(&stats(101, None), now));
    }

    #[test]
    fn size_rotation_in_megabytes() {
        assert_eq!(SizeRotation::new(10).threshold_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn nothing_fires_on_empty_directory() {
        let now = SystemTime::now();
        let empty = ActiveDirStats::default();

        assert!(!SizeRotation::from_bytes(0).should_rotate(&empty, now));
        assert!(!TimeRotation::new(Duration::ZERO).should_rotate(&empty, now));
    }

    #[test]
    fn time_rotation_uses_oldest_file() {
        let policy = TimeRotation::from_hours(24);
        let now = SystemTime::now();

        let fresh = stats(1, Some(now - Duration::from_secs(3600)));
        let stale = stats(1, Some(now - Duration::from_secs(25 * 3600)));
        assert!(!policy.should_rotate(&fresh, now));
        assert!(policy.should_rotate(&stale, now));
    }

    #[test]
    fn any_rotation_reports_trigger() {
        let now = SystemTime::now();
        let policy = AnyRotation::new()
            .with(SizeRotation::from_bytes(1000))
            .with(TimeRotation::from_hours(1));

        assert_eq!(policy.triggered_by(&stats(10, Some(now)), now), None);
        assert_eq!(policy.triggered_by(&stats(2000, Some(now)), now), Some("size"));
        let old = stats(10, Some(now - Duration::from_secs(7200)));
        assert_eq!(policy.triggered_by(&old, now), Some("time"));
        assert!(!AnyRotation::new().should_rotate(&old, now));
    }

    #[test]
    fn collect_skips_directories() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("a.json"), vec![0u8; 10]).expect("write");
        fs::write(dir.path().join("b.json"), vec![0u8; 5]).expect("write");
        fs::create_dir(dir.path().join("sub")).expect("mkdir");

        let stats = ActiveDirStats::collect(dir.path()).expect("collect");
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.total_bytes, 15);
        assert!(stats.oldest_modified.is_some());
    }

    #[test]
    fn rotate_moves_all_files() {
        let dir = TempDir::new().expect("tempdir");
        let layout = StorageLayout::new(dir.path());
        layout.ensure().expect("ensure");
        fs::write(layout.active_dir().join("logs_1.json"), "[]").expect("write");
        fs::write(layout.active_dir().join("logs_2.json"), "[]").expect("write");

        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(42);
        let outcome = rotate_active(&layout, now).expect("rotate");

        assert_eq!(outcome.moved, 2);
        assert_eq!(outcome.archive_dir, layout.archive_dir().join("rotated_42"));
        assert!(outcome.archive_dir.join("logs_1.json").is_file());
        assert!(ActiveDirStats::collect(&layout.active_dir()).expect("collect").is_empty());
    }

    #[test]
    fn rotation_dirs_are_unique_within_a_second() {
        let dir = TempDir::new().expect("tempdir");
        let layout = StorageLayout::new(dir.path());
        layout.ensure().expect("ensure");
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(7);

        fs::write(layout.active_dir().join("logs_7.json"), "[]").expect("write");
        let first = rotate_active(&layout, now).expect("rotate");
        fs::write(layout.active_dir().join("logs_7.json"), "[]").expect("write");
        let second = rotate_active(&layout, now).expect("rotate");

        assert_ne!(first.archive_dir, second.archive_dir);
        assert_eq!(second.archive_dir, layout.archive_dir().join("rotated_7_1"));
        assert_eq!(second.moved, 1);
    }
}
