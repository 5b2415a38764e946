//! Output formatting for CLI commands.
//!
//! Supports text (human-readable) and JSON output formats.

use std::io::Write;
use std::path::PathBuf;

use logvault::{ParsedRecord, PollReport, StorageSummary};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Printed instead of results when a query matches nothing.
pub const NO_RESULTS: &str = "No matching logs found";

/// Output formatter that handles both text and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TextDisplay + ?Sized,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Text => {
                value.write_text(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TextDisplay + ?Sized,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Text)
    }
}

/// Trait for types that have a human-readable rendering.
pub trait TextDisplay {
    /// Write the value as human-readable text.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_text<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Records returned by a query. Serializes as a plain array.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct QueryResults {
    records: Vec<ParsedRecord>,
}

impl QueryResults {
    /// Wraps query output.
    #[must_use]
    pub const fn new(records: Vec<ParsedRecord>) -> Self {
        Self { records }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TextDisplay for QueryResults {
    fn write_text<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Found {} matching log entries:", self.records.len())?;
        for (i, record) in self.records.iter().enumerate() {
            writeln!(writer)?;
            writeln!(writer, "--- Result {} ---", i + 1)?;
            if let Some(ts) = &record.timestamp {
                writeln!(writer, "Time: {ts}")?;
            }
            if let Some(level) = &record.level {
                writeln!(writer, "Level: {level}")?;
            }
            if let Some(source) = &record.source_file {
                writeln!(writer, "Source: {source}")?;
            }
            if let Some(service) = &record.service {
                writeln!(writer, "Service: {service}")?;
            }
            match (record.raw.as_deref(), record.message.as_deref()) {
                (Some(raw), _) if !raw.is_empty() => writeln!(writer, "Log: {raw}")?,
                (_, Some(message)) => writeln!(writer, "Message: {message}")?,
                _ => {}
            }
            writeln!(writer, "{}", "-".repeat(40))?;
        }
        Ok(())
    }
}

/// Summary printed by `logvault status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Storage root.
    pub storage_dir: PathBuf,
    /// Entries in the tracking ledger.
    pub processed_files: usize,
    /// Segments in `active/`.
    pub active_segments: usize,
    /// Rotation directories.
    pub archive_dirs: usize,
    /// Segments across rotation directories.
    pub archived_segments: usize,
    /// Index keys on disk.
    pub index_types: Vec<String>,
}

impl From<StorageSummary> for StatusReport {
    fn from(summary: StorageSummary) -> Self {
        Self {
            storage_dir: summary.root,
            processed_files: summary.processed_files,
            active_segments: summary.active_segments,
            archive_dirs: summary.archive_dirs,
            archived_segments: summary.archived_segments,
            index_types: summary.index_types,
        }
    }
}

impl TextDisplay for StatusReport {
    fn write_text<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let index_types = if self.index_types.is_empty() {
            "(none)".to_string()
        } else {
            self.index_types.join(", ")
        };
        writeln!(writer, "Storage Status")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Root:             {}", self.storage_dir.display())?;
        writeln!(writer, "Processed files:  {}", self.processed_files)?;
        writeln!(writer)?;
        writeln!(writer, "Segments")?;
        writeln!(writer, "  Active:         {}", self.active_segments)?;
        writeln!(writer, "  Archived:       {}", self.archived_segments)?;
        writeln!(writer, "  Rotations:      {}", self.archive_dirs)?;
        writeln!(writer)?;
        writeln!(writer, "Index types:      {index_types}")?;
        Ok(())
    }
}

impl TextDisplay for PollReport {
    fn write_text<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Poll complete")?;
        writeln!(writer, "  Files:          {}", self.files_processed)?;
        writeln!(writer, "  Failed:         {}", self.files_failed)?;
        writeln!(writer, "  Records:        {}", self.records)?;
        writeln!(writer, "  Duplicates:     {}", self.duplicates)?;
        writeln!(writer, "  Segments:       {}", self.segments)?;
        writeln!(writer, "  Rotations:      {}", self.rotations)?;
        Ok(())
    }
}
