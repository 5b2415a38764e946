//! Engine configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file is valid:
//!
//! ```toml
//! input_dir = "/data/parsed"
//! storage_dir = "/data/storage"
//! poll_interval_secs = 10
//!
//! [rotation]
//! size_mb = 10
//! max_age_hours = 24
//!
//! [retention]
//! max_files = 50
//! max_age_days = 30
//! pattern = "rotated_*/logs_*.json"
//!
//! [dedup]
//! max_entries = 100000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dedup::DEFAULT_MAX_ENTRIES;
use crate::error::{Result, StoreError};
use crate::retention::{
    AgeRetention, CountRetention, DEFAULT_PATTERN, FilePattern, RetentionPolicy,
};
use crate::rotation::{AnyRotation, SizeRotation, TimeRotation};

/// When the active directory is rotated. Unset thresholds are disabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RotationConfig {
    /// Rotate once active segments reach this many megabytes.
    pub size_mb: Option<u64>,
    /// Rotate once the oldest active segment is this many hours old.
    pub max_age_hours: Option<u64>,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            size_mb: Some(10),
            max_age_hours: Some(24),
        }
    }
}

/// Which archived segments are pruned after a rotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetentionConfig {
    /// Keep at most this many archived segments.
    pub max_files: Option<usize>,
    /// Delete archived segments older than this many days.
    pub max_age_days: Option<u64>,
    /// Glob selecting candidates, relative to `archive/`.
    pub pattern: String,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_files: None,
            max_age_days: None,
            pattern: DEFAULT_PATTERN.to_string(),
        }
    }
}

/// Deduplication cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DedupConfig {
    /// Distinct lines remembered before eviction.
    pub max_entries: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory polled for input files.
    pub input_dir: PathBuf,
    /// Storage root.
    pub storage_dir: PathBuf,
    /// Seconds between polls.
    pub poll_interval_secs: u64,
    /// Rotation thresholds.
    pub rotation: RotationConfig,
    /// Retention rules.
    pub retention: RetentionConfig,
    /// Dedup settings.
    pub dedup: DedupConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("/data/parsed"),
            storage_dir: PathBuf::from("/data/storage"),
            poll_interval_secs: 10,
            rotation: RotationConfig::default(),
            retention: RetentionConfig::default(),
            dedup: DedupConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a default configuration for the given directories.
    pub fn new(input_dir: impl Into<PathBuf>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            storage_dir: storage_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| StoreError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.input_dir.as_os_str().is_empty() {
            return Err(StoreError::Config("input_dir cannot be empty".to_string()));
        }

        if self.storage_dir.as_os_str().is_empty() {
            return Err(StoreError::Config("storage_dir cannot be empty".to_string()));
        }

        if self.poll_interval_secs == 0 {
            return Err(StoreError::Config(
                "poll_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.rotation.size_mb == Some(0) {
            return Err(StoreError::Config(
                "rotation.size_mb must be greater than 0".to_string(),
            ));
        }

        if self.dedup.max_entries == 0 {
            return Err(StoreError::Config(
                "dedup.max_entries must be greater than 0".to_string(),
            ));
        }

        if self.retention.pattern.trim().is_empty() {
            return Err(StoreError::Config(
                "retention.pattern cannot be empty".to_string(),
            ));
        }
        FilePattern::new(&self.retention.pattern)?;

        Ok(())
    }

    /// Time between polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Builds the configured rotation policy. Size is checked before age.
    #[must_use]
    pub fn rotation_policy(&self) -> AnyRotation {
        let mut policy = AnyRotation::new();
        if let Some(mb) = self.rotation.size_mb {
            policy = policy.with(SizeRotation::new(mb));
        }
        if let Some(hours) = self.rotation.max_age_hours {
            policy = policy.with(TimeRotation::from_hours(hours));
        }
        policy
    }

    /// Builds the configured retention policies, count first.
    #[must_use]
    pub fn retention_policies(&self) -> Vec<Box<dyn RetentionPolicy>> {
        let mut policies: Vec<Box<dyn RetentionPolicy>> = Vec::new();
        if let Some(max_files) = self.retention.max_files {
            policies.push(Box::new(CountRetention::new(max_files)));
        }
        if let Some(days) = self.retention.max_age_days {
            policies.push(Box::new(AgeRetention::from_days(days)));
        }
        policies
    }

    /// Compiles the retention pattern.
    pub fn retention_pattern(&self) -> Result<FilePattern> {
        FilePattern::new(&self.retention.pattern)
    }
}
