//! Review command implementation.

use crate::cli::commands::{connect, print_json};
use crate::cli::{CommandContext, ReviewArgs, ReviewCommands};
use crate::error::{LedgerError, Result};
use crate::review::comments;

/// Execute a review subcommand. Results are printed as JSON.
///
/// # Errors
///
/// Returns an error if configuration is incomplete or the query fails.
pub fn execute(args: &ReviewArgs, ctx: &CommandContext) -> Result<()> {
    match &args.command {
        ReviewCommands::ByPath { prefix, remote } => {
            let remote = connect(ctx, remote)?;
            print_json(&comments::by_path_prefix(&remote.store, prefix)?)
        }
        ReviewCommands::ByProject {
            owner,
            name,
            remote,
        } => {
            let remote = connect(ctx, remote)?;
            print_json(&comments::by_project(&remote.store, owner, name)?)
        }
        ReviewCommands::ByChange { change_id, remote } => {
            let remote = connect(ctx, remote)?;
            print_json(&comments::by_change(&remote.store, change_id)?)
        }
        ReviewCommands::Resolve { ids, remote } => {
            if ids.is_empty() {
                return Err(LedgerError::InvalidQuery(
                    "usage: ledger-sync review resolve <comment-id>...".to_string(),
                ));
            }
            let remote = connect(ctx, remote)?;
            let report = comments::resolve_review(&remote.store, ids)?;
            println!("{}", serde_json::to_string(&report)?);
            Ok(())
        }
    }
}
