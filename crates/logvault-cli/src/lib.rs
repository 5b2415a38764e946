//! # logvault-cli
//!
//! Command-line interface for the logvault engine.
//!
//! Provides commands for:
//! - Running the storage loop (`serve`)
//! - Indexed and full-text queries (`query`)
//! - Inspecting a storage root (`status`)
//!
//! Query results go to stdout; diagnostics go to stderr through `tracing`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format, QueryArgs, QueryMode, ServeArgs, StatusArgs};
pub use error::CliError;
pub use output::OutputFormat;
