//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`serve`] - Storage loop
//! - [`query`] - Indexed lookup and pattern search
//! - [`status`] - Storage root summary

pub mod query;
pub mod serve;
pub mod status;

pub use query::QueryCommand;
pub use serve::ServeCommand;
pub use status::StatusCommand;
