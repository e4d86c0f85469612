use clap::Parser;
use ledger_sync::cli::{self, Cli};
use ledger_sync::logging::{LogOptions, init_logging};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_options = LogOptions::new(cli.verbose, cli.quiet, cli.log_file.as_deref());
    if let Err(err) = init_logging(&log_options) {
        eprintln!("Warning: failed to initialize logging: {err:#}");
    }

    match cli::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(?err, "Command failed");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
