//! Tracing setup for the CLI and tests.
//!
//! Human-readable events go to stderr so stdout stays parseable JSON. With
//! `--log-file` every event is also appended to a file as JSON lines, which is
//! the record to keep when a pull or push is run from automation.

use std::fs::{self, File, OpenOptions};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Crate-wide default level, picked from `-v`/`-q` when `RUST_LOG` is unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Quiet,
    Normal,
    Verbose,
    /// Verbose, plus HTTP client internals.
    Wire,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub const fn from_flags(verbosity: u8, quiet: bool) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbosity {
            0 => Self::Normal,
            1 => Self::Verbose,
            2 => Self::Wire,
            _ => Self::Trace,
        }
    }

    /// `EnvFilter` directive for this level.
    #[must_use]
    pub const fn directive(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "ledger_sync=info",
            Self::Verbose => "ledger_sync=debug",
            Self::Wire => "ledger_sync=debug,reqwest=debug",
            Self::Trace => "ledger_sync=trace,reqwest=debug",
        }
    }

    const fn shows_source(self) -> bool {
        matches!(self, Self::Wire | Self::Trace)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub level: LogLevel,
    pub log_file: Option<PathBuf>,
}

impl LogOptions {
    #[must_use]
    pub fn new(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Self {
        Self {
            level: LogLevel::from_flags(verbosity, quiet),
            log_file: log_file.map(Path::to_path_buf),
        }
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.level.directive()))
            .context("building log filter")
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a global subscriber
/// is already installed.
pub fn init_logging(options: &LogOptions) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(options.level != LogLevel::Normal)
        .with_file(options.level.shows_source())
        .with_line_number(options.level.shows_source())
        .with_ansi(std::io::stderr().is_terminal());

    let json_layer = match &options.log_file {
        Some(path) => Some(
            fmt::layer()
                .json()
                .with_current_span(false)
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(path)?)),
        ),
        None => None,
    };

    // An absent optional layer is a no-op.
    tracing_subscriber::registry()
        .with(options.env_filter()?)
        .with(stderr_layer)
        .with(json_layer)
        .try_init()
        .context("installing tracing subscriber")
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}

/// Route crate events to the test harness output. Safe to call repeatedly.
pub fn init_test_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("ledger_sync=debug")
            .with_test_writer()
            .try_init();
    });
}
