//! logvault binary entrypoint.

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use logvault_cli::cli::{Cli, Commands};
use logvault_cli::commands::{QueryCommand, ServeCommand, StatusCommand};
use logvault_cli::output::OutputFormat;

const DEFAULT_FILTER: &str = "logvault=info,logvault_cli=info";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match build_runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create async runtime")
}

async fn run(cli: Cli) -> Result<(), logvault_cli::CliError> {
    let format = OutputFormat::new(cli.format);

    match cli.command {
        Commands::Serve(args) => {
            let token = CancellationToken::new();
            let on_signal = token.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("interrupt received, shutting down"),
                    Err(e) => warn!(error = %e, "cannot listen for interrupt, shutting down"),
                }
                on_signal.cancel();
            });

            let cmd = ServeCommand::new(&args);
            cmd.execute(&mut io::stdout(), &format, token).await?;
        }
        Commands::Query(args) => {
            let cmd = QueryCommand::new(&args.storage_dir);
            cmd.execute(&mut io::stdout().lock(), &format, &args)?;
        }
        Commands::Status(args) => {
            let cmd = StatusCommand::new(&args.storage_dir);
            cmd.execute(&mut io::stdout().lock(), &format)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use logvault_cli::cli::Format;

    #[test]
    fn cli_parses_status() {
        let cli = Cli::parse_from(["logvault", "status", "--storage-dir", "/s"]);
        assert!(matches!(cli.command, Commands::Status(_)));
    }

    #[test]
    fn cli_parses_global_format() {
        let cli = Cli::parse_from(["logvault", "--format", "json", "status"]);
        assert_eq!(cli.format, Format::Json);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn serve_holds_no_stdout_lock_across_await() {
        let cli = Cli::parse_from(["logvault", "serve", "--once", "--storage-dir", "/nonexistent"]);
        let future = run(cli);
        assert_send(&future);
    }

    #[tokio::test]
    async fn run_query_without_flags_fails() {
        let cli = Cli::parse_from(["logvault", "query", "--storage-dir", "/nonexistent"]);
        let result = run(cli).await;
        assert!(matches!(result, Err(logvault_cli::CliError::Usage(_))));
    }
}
