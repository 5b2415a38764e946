//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::error::CliError;

/// logvault - log storage, indexing and query engine.
#[derive(Parser, Debug, Clone)]
#[command(name = "logvault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(short, long, value_enum, global = true, default_value_t = Format::Text)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Format {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the storage loop: ingest inputs, write segments, rotate, prune.
    Serve(ServeArgs),

    /// Query stored logs by index or by pattern.
    Query(QueryArgs),

    /// Summarize a storage root.
    Status(StatusArgs),
}

/// Arguments for the serve command. Flags override the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// TOML configuration file.
    #[arg(short, long, env = "LOGVAULT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory polled for input files.
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Storage root.
    #[arg(long, env = "LOGVAULT_STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Rotate once active segments reach this many megabytes.
    #[arg(long, value_name = "MB")]
    pub rotation_size: Option<u64>,

    /// Rotate once the oldest active segment is this many hours old.
    #[arg(long, value_name = "HOURS")]
    pub rotation_hours: Option<u64>,

    /// Seconds between polls.
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Run a single poll and exit.
    #[arg(long)]
    pub once: bool,
}

/// Arguments for the query command.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Storage root.
    #[arg(long, env = "LOGVAULT_STORAGE_DIR", default_value = "/data/storage")]
    pub storage_dir: PathBuf,

    /// Index to search (date, level, status, service, format, method, ip, user).
    #[arg(long)]
    pub index_type: Option<String>,

    /// Value to look up in the index.
    #[arg(long)]
    pub index_value: Option<String>,

    /// Case-insensitive regular expression matched against each record.
    #[arg(long)]
    pub pattern: Option<String>,
}

/// What a query invocation asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryMode {
    /// Indexed lookup.
    Index {
        /// Index key.
        key: String,
        /// Value to look up.
        value: String,
    },
    /// Full-text regex scan.
    Pattern(String),
}

impl QueryArgs {
    /// Resolves the flags into exactly one query mode.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Usage`] unless either both index flags or only
    /// the pattern is given.
    pub fn mode(&self) -> Result<QueryMode, CliError> {
        let non_empty = |v: &Option<String>| v.as_ref().filter(|s| !s.is_empty()).cloned();
        match (
            non_empty(&self.index_type),
            non_empty(&self.index_value),
            non_empty(&self.pattern),
        ) {
            (Some(key), Some(value), None) => Ok(QueryMode::Index { key, value }),
            (None, None, Some(pattern)) => Ok(QueryMode::Pattern(pattern)),
            _ => Err(CliError::Usage(
                "specify either --index-type with --index-value, or --pattern".to_string(),
            )),
        }
    }
}

/// Arguments for the status command.
#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Storage root.
    #[arg(long, env = "LOGVAULT_STORAGE_DIR", default_value = "/data/storage")]
    pub storage_dir: PathBuf,
}
