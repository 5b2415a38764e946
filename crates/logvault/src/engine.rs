//! The storage engine: ingest inputs, write segments, index, rotate, prune.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{Result, StoreError};
use crate::index::IndexManager;
use crate::ingest::{Compression, IngestHandler, IngestOutcome, InputKind};
use crate::ledger::TrackingLedger;
use crate::retention::{FilePattern, RetentionPolicy, remove_empty_dirs};
use crate::rotation::{ActiveDirStats, AnyRotation, RotationOutcome, rotate_active};
use crate::segment::{StorageLayout, write_segment};
use crate::types::ParsedRecord;

/// What one poll of the input directory did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    /// Input files ingested and marked processed.
    pub files_processed: usize,
    /// Input files that failed and will be retried next poll.
    pub files_failed: usize,
    /// Records stored.
    pub records: usize,
    /// Lines dropped as duplicates.
    pub duplicates: usize,
    /// Segments written.
    pub segments: usize,
    /// Rotations performed.
    pub rotations: usize,
}

/// Point-in-time view of a running engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    /// Storage root.
    pub storage_dir: PathBuf,
    /// Input directory.
    pub input_dir: PathBuf,
    /// Files recorded in the ledger.
    pub processed_files: usize,
    /// Hashes in the dedup cache.
    pub dedup_entries: usize,
    /// Dedup cache capacity.
    pub dedup_capacity: usize,
    /// Polls completed since start.
    pub polls: u64,
    /// Segments written since start.
    pub segments_written: u64,
    /// Rotations since start.
    pub rotations: u64,
    /// End of the most recent poll.
    pub last_poll: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Counters {
    polls: u64,
    segments_written: u64,
    rotations: u64,
    last_poll: Option<DateTime<Utc>>,
}

/// Owns one storage root and writes to it.
pub struct StorageEngine {
    config: EngineConfig,
    layout: StorageLayout,
    ingest: IngestHandler,
    index: IndexManager,
    rotation: AnyRotation,
    retention: Vec<Box<dyn RetentionPolicy>>,
    retention_pattern: FilePattern,
    ledger: RwLock<TrackingLedger>,
    counters: RwLock<Counters>,
}

impl StorageEngine {
    /// Validates `config`, creates the storage layout and loads the ledger.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let layout = StorageLayout::new(&config.storage_dir);
        layout.ensure()?;

        let ledger = TrackingLedger::load(layout.tracking_file());
        info!(
            storage = %layout.root().display(),
            input = %config.input_dir.display(),
            processed = ledger.len(),
            "storage engine ready"
        );

        Ok(Self {
            ingest: IngestHandler::new(config.dedup.max_entries),
            index: IndexManager::new(layout.index_dir()),
            rotation: config.rotation_policy(),
            retention: config.retention_policies(),
            retention_pattern: config.retention_pattern()?,
            ledger: RwLock::new(ledger),
            counters: RwLock::new(Counters::default()),
            layout,
            config,
        })
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The storage layout.
    #[must_use]
    pub const fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Writes a batch as a new segment, indexes it and checks rotation.
    ///
    /// Returns the segment path relative to the storage root.
    pub fn store_batch(&self, records: &[ParsedRecord]) -> Result<PathBuf> {
        self.persist(records).map(|(segment, _)| segment)
    }

    fn persist(&self, records: &[ParsedRecord]) -> Result<(PathBuf, Option<RotationOutcome>)> {
        let segment = write_segment(&self.layout, records, SystemTime::now())?;
        self.counters.write().segments_written += 1;
        debug!(segment = %segment.display(), records = records.len(), "stored segment");

        // The segment is already durable; an index failure leaves it unindexed.
        if let Err(e) = self.index.index(records, &segment) {
            error!(segment = %segment.display(), error = %e, "failed to index segment");
        }

        let rotated = self.check_rotation();
        Ok((segment, rotated))
    }

    /// Rotates the active directory if the policy fires, then applies retention.
    pub fn check_rotation(&self) -> Option<RotationOutcome> {
        let stats = match ActiveDirStats::collect(&self.layout.active_dir()) {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "cannot inspect active directory");
                return None;
            }
        };
        let now = SystemTime::now();
        let trigger = self.rotation.triggered_by(&stats, now)?;

        info!(
            trigger,
            files = stats.file_count,
            bytes = stats.total_bytes,
            "rotation triggered"
        );
        let outcome = match rotate_active(&self.layout, now) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "rotation failed");
                return None;
            }
        };
        self.counters.write().rotations += 1;
        self.apply_retention(now);
        Some(outcome)
    }

    fn apply_retention(&self, now: SystemTime) {
        if self.retention.is_empty() {
            return;
        }
        let archive = self.layout.archive_dir();
        for policy in &self.retention {
            let report = policy.apply(&archive, &self.retention_pattern, now);
            if !report.deleted.is_empty() || !report.failed.is_empty() {
                info!(
                    policy = policy.name(),
                    matched = report.matched,
                    deleted = report.deleted.len(),
                    failed = report.failed.len(),
                    "retention applied"
                );
            }
        }
        remove_empty_dirs(&archive);
    }

    /// Ingests every new input file once.
    ///
    /// A file that fails is logged, left out of the ledger, and retried on
    /// the next poll. Only a failure to list the input directory is an error.
    pub fn poll_once(&self) -> Result<PollReport> {
        let inputs = self.pending_inputs()?;
        let mut report = PollReport::default();

        for (name, path, kind) in inputs {
            match self.process_file(&name, &path, kind, &mut report) {
                Ok(()) => report.files_processed += 1,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "failed to process input file");
                    report.files_failed += 1;
                }
            }
        }

        if self.check_rotation().is_some() {
            report.rotations += 1;
        }

        let mut counters = self.counters.write();
        counters.polls += 1;
        counters.last_poll = Some(Utc::now());
        drop(counters);

        if report.files_processed > 0 || report.files_failed > 0 {
            info!(
                files = report.files_processed,
                failed = report.files_failed,
                records = report.records,
                duplicates = report.duplicates,
                segments = report.segments,
                rotations = report.rotations,
                "poll complete"
            );
        }
        Ok(report)
    }

    fn pending_inputs(&self) -> Result<Vec<(String, PathBuf, InputKind)>> {
        let dir = &self.config.input_dir;
        let entries = fs::read_dir(dir).map_err(|e| StoreError::at(dir, e))?;

        let ledger = self.ledger.read();
        let mut pending = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::at(dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(kind) = InputKind::from_path(&path) else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if ledger.contains(&name) {
                continue;
            }
            pending.push((name, path, kind));
        }
        pending.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pending)
    }

    fn process_file(
        &self,
        name: &str,
        path: &Path,
        kind: InputKind,
        report: &mut PollReport,
    ) -> Result<()> {
        let outcome = self.read_input(name, path, kind)?;

        report.duplicates += outcome.duplicates;
        if !outcome.records.is_empty() {
            let (_, rotated) = match self.persist(&outcome.records) {
                Ok(stored) => stored,
                Err(e) => {
                    // Unstored lines must not count as seen when the file is retried.
                    self.ingest.release(&outcome);
                    return Err(e);
                }
            };
            report.records += outcome.records.len();
            report.segments += 1;
            if rotated.is_some() {
                report.rotations += 1;
            }
        }

        let mut ledger = self.ledger.write();
        ledger.mark(name);
        ledger.save()
    }

    fn read_input(&self, name: &str, path: &Path, kind: InputKind) -> Result<IngestOutcome> {
        let file = File::open(path).map_err(|e| StoreError::at(path, e))?;
        let outcome = match Compression::from_path(path) {
            Compression::None => self.ingest.ingest_reader(name, BufReader::new(file), kind),
            Compression::Gzip => {
                self.ingest
                    .ingest_reader(name, BufReader::new(GzDecoder::new(file)), kind)
            }
        };
        outcome.map_err(|e| StoreError::at(path, e))
    }

    /// Polls every `poll_interval_secs` until `token` is cancelled.
    ///
    /// Cancellation is observed between polls; a poll in progress completes.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.config.poll_interval_secs, "polling started");

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let engine = Arc::clone(&self);
            match tokio::task::spawn_blocking(move || engine.poll_once()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!(error = %e, "poll failed"),
                Err(e) => error!(error = %e, "poll task panicked"),
            }
        }

        info!("polling stopped");
    }

    /// Snapshot of the engine's state. Safe to call while [`run`](Self::run) is active.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let counters = self.counters.read();
        let cache = self.ingest.cache().read();
        EngineStatus {
            storage_dir: self.layout.root().to_path_buf(),
            input_dir: self.config.input_dir.clone(),
            processed_files: self.ledger.read().len(),
            dedup_entries: cache.len(),
            dedup_capacity: cache.max_entries(),
            polls: counters.polls,
            segments_written: counters.segments_written,
            rotations: counters.rotations,
            last_poll: counters.last_poll,
        }
    }
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("storage_dir", &self.layout.root())
            .field("input_dir", &self.config.input_dir)
            .field("rotation", &self.rotation)
            .finish_non_exhaustive()
    }
}
