//! Serve command implementation.
//!
//! Builds an [`EngineConfig`] from an optional TOML file plus flag
//! overrides, then runs the polling loop until cancelled.

use std::io::Write;
use std::sync::Arc;

use logvault::{EngineConfig, StorageEngine};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::ServeArgs;
use crate::error::CliError;
use crate::output::OutputFormat;

/// Handler for the serve command.
pub struct ServeCommand<'a> {
    args: &'a ServeArgs,
}

impl<'a> ServeCommand<'a> {
    /// Creates a serve command.
    #[must_use]
    pub const fn new(args: &'a ServeArgs) -> Self {
        Self { args }
    }

    /// Resolves the effective configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is unreadable or the result is invalid.
    pub fn config(&self) -> Result<EngineConfig, CliError> {
        let args = self.args;
        let mut config = match &args.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };

        if let Some(dir) = &args.input_dir {
            config.input_dir.clone_from(dir);
        }
        if let Some(dir) = &args.storage_dir {
            config.storage_dir.clone_from(dir);
        }
        if let Some(mb) = args.rotation_size {
            config.rotation.size_mb = Some(mb);
        }
        if let Some(hours) = args.rotation_hours {
            config.rotation.max_age_hours = Some(hours);
        }
        if let Some(secs) = args.interval {
            config.poll_interval_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }

    /// Executes the serve command.
    ///
    /// With `--once` a single poll runs and its report is written to `out`.
    /// Otherwise the loop runs until `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration or startup fails.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        token: CancellationToken,
    ) -> Result<(), CliError> {
        let config = self.config()?;
        let engine = StorageEngine::new(config)?;

        if self.args.once {
            let report = engine.poll_once()?;
            return format.write(out, &report);
        }

        let engine = Arc::new(engine);
        Arc::clone(&engine).run(token).await;

        let status = engine.status();
        info!(
            polls = status.polls,
            segments = status.segments_written,
            rotations = status.rotations,
            "storage engine stopped"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use std::fs;
    use std::io::Write as _;
    use tempfile::{NamedTempFile, TempDir};

    fn args_for(dir: &TempDir) -> ServeArgs {
        ServeArgs {
            input_dir: Some(dir.path().join("in")),
            storage_dir: Some(dir.path().join("storage")),
            ..ServeArgs::default()
        }
    }

    #[test]
    fn flags_override_config_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(b"poll_interval_secs = 30\n[rotation]\nsize_mb = 99\n")
            .expect("write");
        let args = ServeArgs {
            config: Some(file.path().to_path_buf()),
            interval: Some(5),
            rotation_hours: Some(2),
            ..ServeArgs::default()
        };

        let config = ServeCommand::new(&args).config().expect("config");
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.rotation.size_mb, Some(99));
        assert_eq!(config.rotation.max_age_hours, Some(2));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let args = ServeArgs {
            interval: Some(0),
            ..ServeArgs::default()
        };
        let err = ServeCommand::new(&args).config().expect_err("invalid");
        assert!(matches!(err, CliError::Config(_)));
    }

    #[tokio::test]
    async fn once_runs_a_single_poll() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir_all(dir.path().join("in")).expect("mkdir");
        fs::write(dir.path().join("in/app.log"), "[2025-10-24T11:00:00Z] INFO [api] up\n")
            .expect("write");
        let args = ServeArgs {
            once: true,
            ..args_for(&dir)
        };

        let mut out = Vec::new();
        ServeCommand::new(&args)
            .execute(&mut out, &OutputFormat::new(Format::Json), CancellationToken::new())
            .await
            .expect("serve");

        let report: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(report["files_processed"], 1);
        assert_eq!(report["records"], 1);
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_loop() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir_all(dir.path().join("in")).expect("mkdir");
        let args = args_for(&dir);
        let token = CancellationToken::new();
        token.cancel();

        let mut out = Vec::new();
        ServeCommand::new(&args)
            .execute(&mut out, &OutputFormat::default(), token)
            .await
            .expect("serve");
        assert!(out.is_empty());
    }
}
