//! Command-line interface for `ledger-sync`.

pub mod commands;

use crate::config::{self, CliOverrides};
use crate::error::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Sync an issue ledger with a remote store and work with review checkpoints.
#[derive(Parser, Debug)]
#[command(name = "ledger-sync", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Also write JSON logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Ledger file (default: issues.jsonl in the nearest .beads directory)
    #[arg(long, global = true, value_name = "PATH", env = "BEADS_JSONL")]
    pub ledger: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild the local ledger from the remote store
    Pull(SyncArgs),
    /// Upsert the local ledger into the remote store
    Push(SyncArgs),
    /// Find a checkpoint with its unresolved comments and content
    Query(QueryArgs),
    /// Mark checkpoint comments as resolved
    Resolve(ResolveArgs),
    /// Change-level review comments
    Review(ReviewArgs),
}

/// Remote connection and project overrides.
#[derive(Args, Debug, Clone, Default)]
pub struct RemoteArgs {
    /// Repository owner of the remote project
    #[arg(long, value_name = "OWNER")]
    pub repo_owner: Option<String>,

    /// Repository name of the remote project
    #[arg(long, value_name = "NAME")]
    pub repo_name: Option<String>,

    /// Remote store URL
    #[arg(long, value_name = "URL", alias = "supabase-url")]
    pub remote_url: Option<String>,

    /// Remote store API key
    #[arg(long, value_name = "KEY", alias = "supabase-key")]
    pub remote_key: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,
}

impl RemoteArgs {
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            url: self.remote_url.clone(),
            key: self.remote_key.clone(),
            repo_owner: self.repo_owner.clone(),
            repo_name: self.repo_name.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Artifact file path
    #[arg(long, alias = "filePath", value_name = "PATH")]
    pub file_path: Option<String>,

    /// Commit SHA
    #[arg(long, alias = "commitSHA", value_name = "SHA")]
    pub commit_sha: Option<String>,

    /// Checkpoint id
    #[arg(long, alias = "checkpointId", value_name = "ID")]
    pub checkpoint_id: Option<String>,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ResolveArgs {
    /// Comment ids to mark resolved
    #[arg(value_name = "ID")]
    pub ids: Vec<String>,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ReviewArgs {
    #[command(subcommand)]
    pub command: ReviewCommands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReviewCommands {
    /// Unresolved comments on files under a path prefix
    ByPath {
        prefix: String,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Unresolved comments of every open change in a project
    ByProject {
        owner: String,
        name: String,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Unresolved comments of one change
    ByChange {
        change_id: String,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Mark review comments as resolved
    Resolve {
        #[arg(value_name = "ID")]
        ids: Vec<String>,
        #[command(flatten)]
        remote: RemoteArgs,
    },
}

/// Paths shared by every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub beads_dir: PathBuf,
    pub ledger_path: PathBuf,
}

impl CommandContext {
    /// # Errors
    ///
    /// Returns an error if the working directory cannot be read.
    pub fn resolve(ledger: Option<&std::path::Path>) -> Result<Self> {
        let beads_dir = config::discover_beads_dir(None)?;
        let ledger_path = config::resolve_ledger_path(&beads_dir, ledger);
        Ok(Self {
            beads_dir,
            ledger_path,
        })
    }
}

/// Dispatch a parsed command line.
///
/// # Errors
///
/// Returns the command's error.
pub fn run(cli: &Cli) -> Result<()> {
    let ctx = CommandContext::resolve(cli.ledger.as_deref())?;
    match &cli.command {
        Commands::Pull(args) => commands::pull::execute(args, &ctx),
        Commands::Push(args) => commands::push::execute(args, &ctx),
        Commands::Query(args) => commands::query::execute(args, &ctx),
        Commands::Resolve(args) => commands::resolve::execute(args, &ctx),
        Commands::Review(args) => commands::review::execute(args, &ctx),
    }
}
