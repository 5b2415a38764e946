//! Persistent record of which input files have been ingested.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::segment::write_json_atomic;

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    processed_files: Vec<String>,
    #[serde(default)]
    last_updated: Option<String>,
}

/// Set of processed input file names, stored as `storage_tracking.json`.
#[derive(Debug, Clone)]
pub struct TrackingLedger {
    path: PathBuf,
    processed: BTreeSet<String>,
    last_updated: Option<DateTime<Utc>>,
}

impl TrackingLedger {
    /// Creates an empty ledger that saves to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            processed: BTreeSet::new(),
            last_updated: None,
        }
    }

    /// Loads the ledger at `path`.
    ///
    /// A missing file yields an empty ledger. So does an unreadable or
    /// corrupt one, after a warning.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::empty(path),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read tracking ledger, starting empty");
                return Self::empty(path);
            }
        };

        match serde_json::from_slice::<LedgerFile>(&bytes) {
            Ok(file) => Self {
                last_updated: file
                    .last_updated
                    .as_deref()
                    .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
                processed: file.processed_files.into_iter().collect(),
                path,
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt tracking ledger, starting empty");
                Self::empty(path)
            }
        }
    }

    /// Returns `true` if `name` has been processed.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.processed.contains(name)
    }

    /// Marks `name` as processed. Returns `false` if it already was.
    pub fn mark(&mut self, name: impl Into<String>) -> bool {
        self.processed.insert(name.into())
    }

    /// Number of processed files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.processed.len()
    }

    /// Returns `true` if nothing has been processed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    /// Processed names in sorted order.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.processed.iter().map(String::as_str)
    }

    /// Time of the last successful save.
    #[must_use]
    pub const fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Where the ledger is stored.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the ledger to disk.
    pub fn save(&mut self) -> Result<()> {
        let now = Utc::now();
        let file = LedgerFile {
            processed_files: self.processed.iter().cloned().collect(),
            last_updated: Some(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| crate::error::StoreError::at(parent, e))?;
        }
        write_json_atomic(&self.path, &file)?;
        self.last_updated = Some(now);
        Ok(())
    }
}
