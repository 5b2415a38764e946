//! Status command implementation.

use std::io::Write;
use std::path::Path;

use logvault::QueryEngine;

use crate::error::CliError;
use crate::output::{OutputFormat, StatusReport};

/// Handler for the status command.
pub struct StatusCommand<'a> {
    storage_dir: &'a Path,
}

impl<'a> StatusCommand<'a> {
    /// Creates a status command over a storage root.
    #[must_use]
    pub const fn new(storage_dir: &'a Path) -> Self {
        Self { storage_dir }
    }

    /// Executes the status command. Reads only; nothing is created.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage root does not exist or writing fails.
    pub fn execute<W: Write>(&self, out: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        if !self.storage_dir.is_dir() {
            return Err(CliError::Config(format!(
                "storage directory '{}' does not exist",
                self.storage_dir.display()
            )));
        }
        let report = StatusReport::from(QueryEngine::new(self.storage_dir).summary());
        format.write(out, &report)
    }
}
