//! Resolve command implementation.

use crate::cli::commands::connect;
use crate::cli::{CommandContext, ResolveArgs};
use crate::error::{LedgerError, Result};
use crate::review::comments;

/// Execute the resolve command, printing `{"success":true,"resolved":N}`.
///
/// # Errors
///
/// Returns an error for an empty id list, incomplete configuration, or a
/// failed batch update.
pub fn execute(args: &ResolveArgs, ctx: &CommandContext) -> Result<()> {
    if args.ids.is_empty() {
        return Err(LedgerError::InvalidQuery(
            "usage: ledger-sync resolve <comment-id>...".to_string(),
        ));
    }
    let remote = connect(ctx, &args.remote)?;
    let report = comments::resolve(&remote.store, &args.ids)?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
