//! Query command implementation.

use std::io::Write;
use std::path::Path;

use logvault::QueryEngine;

use crate::cli::{QueryArgs, QueryMode};
use crate::error::CliError;
use crate::output::{NO_RESULTS, OutputFormat, QueryResults};

/// Handler for the query command.
pub struct QueryCommand<'a> {
    storage_dir: &'a Path,
}

impl<'a> QueryCommand<'a> {
    /// Creates a query command over a storage root.
    #[must_use]
    pub const fn new(storage_dir: &'a Path) -> Self {
        Self { storage_dir }
    }

    /// Executes the query command.
    ///
    /// # Errors
    ///
    /// Returns an error for contradictory flags, an unknown index type,
    /// an invalid pattern, or a failed write.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &QueryArgs,
    ) -> Result<(), CliError> {
        let mode = args.mode()?;
        let engine = QueryEngine::new(self.storage_dir);

        let records = match mode {
            QueryMode::Index { key, value } => {
                let valid = engine.index_types()?;
                if !valid.iter().any(|t| *t == key) {
                    return Err(CliError::InvalidIndexType { given: key, valid });
                }
                engine.find_by_index(&key, &value)
            }
            QueryMode::Pattern(pattern) => engine.search_all(&pattern)?,
        };

        let results = QueryResults::new(records);
        if results.is_empty() {
            writeln!(out, "{NO_RESULTS}")?;
            return Ok(());
        }
        format.write(out, &results)
    }
}
