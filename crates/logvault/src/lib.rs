//! # logvault
//!
//! Log storage, indexing and query engine.
//!
//! This crate provides:
//!
//! - [`LogParser`]: Detects apache, nginx, app and JSON lines and normalizes them
//! - [`IngestHandler`]: Drops repeated lines through a bounded [`DedupCache`]
//! - [`StorageEngine`]: Writes segments, indexes them, rotates and prunes
//! - [`RotationPolicy`]: Size and age triggers for archiving the active directory
//! - [`RetentionPolicy`]: Count and age pruning of archived segments
//! - [`IndexManager`]: Append-only inverted index over key attributes
//! - [`QueryEngine`]: Indexed lookup and case-insensitive full-text scan
//! - [`TrackingLedger`]: Persistent list of ingested input files
//!
//! ## Example
//!
//! ```rust,no_run
//! use logvault::{EngineConfig, QueryEngine, StorageEngine, parse_line};
//!
//! let engine = StorageEngine::new(EngineConfig::new("/data/parsed", "/data/storage"))?;
//! let record = parse_line(
//!     r#"203.0.113.45 - - [24/Oct/2025:11:02:52 +0000] "GET /users HTTP/1.1" 200 1024 "-" "curl/7.68.0""#,
//! );
//! engine.store_batch(&[record])?;
//!
//! let queries = QueryEngine::new("/data/storage");
//! let ok = queries.find_by_index("status", "200");
//! assert!(!ok.is_empty());
//! # Ok::<(), logvault::StoreError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod index;
pub mod ingest;
pub mod ledger;
pub mod parser;
pub mod query;
pub mod retention;
pub mod rotation;
pub mod segment;
pub mod types;

// Re-export main types
pub use config::{DedupConfig, EngineConfig, RetentionConfig, RotationConfig};
pub use dedup::DedupCache;
pub use engine::{EngineStatus, PollReport, StorageEngine};
pub use error::{QueryError, Result, StoreError};
pub use index::{INDEX_KEYS, IndexEntry, IndexManager, IndexStats, derive_keys, sanitize_value};
pub use ingest::{Compression, IngestHandler, IngestOutcome, InputKind};
pub use ledger::TrackingLedger;
pub use parser::{LogParser, parse_line};
pub use query::{QueryEngine, StorageSummary};
pub use retention::{AgeRetention, CountRetention, FilePattern, RetentionPolicy, RetentionReport};
pub use rotation::{
    ActiveDirStats, AnyRotation, RotationOutcome, RotationPolicy, SizeRotation, TimeRotation,
};
pub use segment::StorageLayout;
pub use types::{LogFormat, ParsedRecord, RawLine};
