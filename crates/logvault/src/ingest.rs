//! Deduplicating ingestion: drop repeated lines, parse the rest.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::dedup::{DedupCache, line_hash};
use crate::parser::LogParser;
use crate::types::{ParsedRecord, RawLine};

const GZIP_EXT: &str = "gz";

/// How the lines of an input file are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Free-form log lines (`.log`, `.txt`), parsed by dialect.
    RawText,
    /// Newline-delimited records already normalized upstream (`.json`, `.jsonl`).
    Records,
}

impl InputKind {
    /// Classifies an input file by extension. Returns `None` for files the
    /// engine ignores.
    ///
    /// A trailing `.gz` is looked through: `app.log.gz` is raw text and
    /// `batch.jsonl.gz` is records. A bare `batch.gz` holds records.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = lower_extension(path)?;
        if ext != GZIP_EXT {
            return Self::from_extension(&ext);
        }
        match path.file_stem().map(Path::new).and_then(lower_extension) {
            Some(inner) => Self::from_extension(&inner),
            None => Some(Self::Records),
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "log" | "txt" => Some(Self::RawText),
            "json" | "jsonl" => Some(Self::Records),
            _ => None,
        }
    }
}

/// How an input file is encoded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain text.
    None,
    /// gzip stream (`*.gz`).
    Gzip,
}

impl Compression {
    /// Detects compression from the file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        if lower_extension(path).is_some_and(|ext| ext == GZIP_EXT) {
            Self::Gzip
        } else {
            Self::None
        }
    }
}

fn lower_extension(path: &Path) -> Option<String> {
    Some(path.extension()?.to_str()?.to_ascii_lowercase())
}

/// Records produced from one input, plus how many lines were dropped as repeats.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    /// Parsed, first-seen records in input order.
    pub records: Vec<ParsedRecord>,
    /// Lines skipped because they had been seen before.
    pub duplicates: usize,
    admitted: Vec<u64>,
}

/// Filters repeated lines through a shared [`DedupCache`] and parses the rest.
#[derive(Debug, Clone)]
pub struct IngestHandler {
    parser: LogParser,
    cache: Arc<RwLock<DedupCache>>,
}

impl IngestHandler {
    /// Creates a handler with its own cache of `max_entries` hashes.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self::with_cache(Arc::new(RwLock::new(DedupCache::new(max_entries))))
    }

    /// Creates a handler over an existing cache.
    #[must_use]
    pub const fn with_cache(cache: Arc<RwLock<DedupCache>>) -> Self {
        Self {
            parser: LogParser::new(),
            cache,
        }
    }

    /// Returns the shared cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<RwLock<DedupCache>> {
        &self.cache
    }

    /// Returns `true` if the line has not been seen recently.
    pub fn should_process(&self, line: &str) -> bool {
        self.cache.write().check_and_insert(line)
    }

    /// Forgets every line `outcome` admitted, so the same input is accepted
    /// again. Used when its records could not be stored.
    pub fn release(&self, outcome: &IngestOutcome) {
        let mut cache = self.cache.write();
        for hash in &outcome.admitted {
            cache.forget_hash(*hash);
        }
        debug!(lines = outcome.admitted.len(), "released dedup entries");
    }

    /// Deduplicates and parses a free-form line.
    pub fn ingest_line(&self, line: &RawLine) -> Option<ParsedRecord> {
        if !self.should_process(&line.text) {
            return None;
        }
        Some(self.parser.parse(&line.text).with_source_file(line.source.clone()))
    }

    /// Deduplicates and decodes a line that carries an upstream record.
    ///
    /// Objects with a `format` key are taken as already-normalized records.
    /// Anything else is parsed as a free-form line.
    pub fn ingest_record_line(&self, line: &RawLine) -> Option<ParsedRecord> {
        if !self.should_process(&line.text) {
            return None;
        }
        let record = decode_record(&line.text).unwrap_or_else(|| self.parser.parse(&line.text));
        Some(record.with_source_file(line.source.clone()))
    }

    /// Reads every non-blank line of `reader` and ingests it.
    ///
    /// Invalid UTF-8 is decoded lossily; only a failing reader is an error,
    /// in which case the lines read so far are released from the cache.
    pub fn ingest_reader<R: BufRead>(
        &self,
        source: &str,
        reader: R,
        kind: InputKind,
    ) -> std::io::Result<IngestOutcome> {
        let mut outcome = IngestOutcome::default();

        for bytes in reader.split(b'\n') {
            let bytes = match bytes {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.release(&outcome);
                    return Err(e);
                }
            };
            let line = String::from_utf8_lossy(&bytes);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if line.trim().is_empty() {
                continue;
            }
            let raw = RawLine::new(source, line);
            let record = match kind {
                InputKind::RawText => self.ingest_line(&raw),
                InputKind::Records => self.ingest_record_line(&raw),
            };
            match record {
                Some(record) => {
                    outcome.admitted.push(line_hash(&raw.text));
                    outcome.records.push(record);
                }
                None => outcome.duplicates += 1,
            }
        }

        debug!(
            source,
            records = outcome.records.len(),
            duplicates = outcome.duplicates,
            "ingested input"
        );
        Ok(outcome)
    }
}

impl Default for IngestHandler {
    fn default() -> Self {
        Self::new(crate::dedup::DEFAULT_MAX_ENTRIES)
    }
}

fn decode_record(line: &str) -> Option<ParsedRecord> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    let has_format = value.get("format").is_some_and(Value::is_string);
    if !has_format {
        return None;
    }
    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(error = %e, "malformed upstream record, parsing as raw line");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogFormat;
    use std::io::Cursor;

    #[test]
    fn repeated_line_is_dropped() {
        let handler = IngestHandler::new(100);
        let line = RawLine::new("app.log", "[2025-10-24T11:02:52Z] INFO [api] started");

        let first = handler.ingest_line(&line).expect("first sighting");
        assert_eq!(first.format, LogFormat::App);
        assert_eq!(first.source_file.as_deref(), Some("app.log"));
        assert!(handler.ingest_line(&line).is_none());
    }

    #[test]
    fn handlers_share_a_cache() {
        let a = IngestHandler::new(100);
        let b = IngestHandler::with_cache(Arc::clone(a.cache()));

        assert!(a.should_process("hello"));
        assert!(!b.should_process("hello"));
    }

    #[test]
    fn reader_skips_blank_lines_and_counts_duplicates() {
        let handler = IngestHandler::new(100);
        let input = "first line\n\n   \nsecond line\nfirst line\n";

        let outcome = handler
            .ingest_reader("input.log", Cursor::new(input), InputKind::RawText)
            .expect("read");

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.duplicates, 1);
        assert!(outcome.records.iter().all(|r| r.source_file.as_deref() == Some("input.log")));
    }

    #[test]
    fn record_lines_decode_upstream_records() {
        let handler = IngestHandler::new(100);
        let input = concat!(
            r#"{"format":"nginx","log_level":"WARN","message":"slow upstream"}"#,
            "\n",
            r#"{"msg":"plain json","service":"billing"}"#,
            "\n",
            "not json at all\n",
        );

        let outcome = handler
            .ingest_reader("parsed.json", Cursor::new(input), InputKind::Records)
            .expect("read");

        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.records[0].format, LogFormat::Nginx);
        assert_eq!(outcome.records[0].level.as_deref(), Some("WARN"));
        assert_eq!(outcome.records[1].format, LogFormat::Json);
        assert_eq!(outcome.records[1].message.as_deref(), Some("plain json"));
        assert_eq!(outcome.records[2].format, LogFormat::Unknown);
    }

    #[test]
    fn malformed_upstream_record_falls_back_to_parser() {
        let handler = IngestHandler::new(100);
        let line = RawLine::new("parsed.json", r#"{"format":"martian","message":"x"}"#);

        let record = handler.ingest_record_line(&line).expect("first sighting");
        assert_eq!(record.format, LogFormat::Json);
        assert_eq!(record.extra.get("format"), Some(&serde_json::json!("martian")));
    }

    #[test]
    fn input_kind_by_extension() {
        assert_eq!(InputKind::from_path(Path::new("a.log")), Some(InputKind::RawText));
        assert_eq!(InputKind::from_path(Path::new("a.TXT")), Some(InputKind::RawText));
        assert_eq!(InputKind::from_path(Path::new("a.json")), Some(InputKind::Records));
        assert_eq!(InputKind::from_path(Path::new("a.jsonl")), Some(InputKind::Records));
        assert_eq!(InputKind::from_path(Path::new("a.log.gz")), Some(InputKind::RawText));
        assert_eq!(InputKind::from_path(Path::new("a.jsonl.GZ")), Some(InputKind::Records));
        assert_eq!(InputKind::from_path(Path::new("a.gz")), Some(InputKind::Records));
        assert_eq!(InputKind::from_path(Path::new("a.csv.gz")), None);
        assert_eq!(InputKind::from_path(Path::new("a.csv")), None);
        assert_eq!(InputKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn compression_by_extension() {
        assert_eq!(Compression::from_path(Path::new("a.log.gz")), Compression::Gzip);
        assert_eq!(Compression::from_path(Path::new("a.log")), Compression::None);
    }

    #[test]
    fn invalid_utf8_line_is_kept_lossily() {
        let handler = IngestHandler::new(100);
        let input: &[u8] = b"good line one\nbad \xff\xfe bytes\r\ngood line two\n";

        let outcome = handler
            .ingest_reader("a.log", Cursor::new(input), InputKind::RawText)
            .expect("read");

        assert_eq!(outcome.records.len(), 3);
        let bad = &outcome.records[1];
        assert_eq!(bad.format, LogFormat::Unknown);
        assert_eq!(bad.raw.as_deref(), Some("bad \u{fffd}\u{fffd} bytes"));
        assert_eq!(outcome.records[2].raw.as_deref(), Some("good line two"));
    }

    struct BrokenReader;

    impl std::io::Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "truncated stream"))
        }
    }

    #[test]
    fn reader_error_releases_lines_read_so_far() {
        use std::io::{BufReader, Read as _};

        let handler = IngestHandler::new(100);
        let reader = BufReader::new(Cursor::new("line before failure\n").chain(BrokenReader));

        let err = handler
            .ingest_reader("a.log.gz", reader, InputKind::RawText)
            .expect_err("reader fails");
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert!(handler.should_process("line before failure"));
    }

    #[test]
    fn released_lines_are_accepted_again() {
        let handler = IngestHandler::new(100);
        let input = "kept line\nlost line\n";
        handler.should_process("kept line");

        let outcome = handler
            .ingest_reader("a.log", Cursor::new(input), InputKind::RawText)
            .expect("read");
        assert_eq!(outcome.records.len(), 1);
        handler.release(&outcome);

        assert!(!handler.should_process("kept line"));
        assert!(handler.should_process("lost line"));
    }
}
