//! Pull command implementation.

use crate::cli::commands::{connect, print_json};
use crate::cli::{CommandContext, SyncArgs};
use crate::config::RepoCoordinates;
use crate::error::Result;
use crate::sync::{self, SyncTarget};

/// Execute the pull command.
///
/// # Errors
///
/// Returns an error if configuration is incomplete or the pull fails.
pub fn execute(args: &SyncArgs, ctx: &CommandContext) -> Result<()> {
    let remote = connect(ctx, &args.remote)?;
    let repo = RepoCoordinates::from_layer(&remote.layer)?;
    let target = SyncTarget {
        repo_owner: repo.owner,
        repo_name: repo.name,
        ledger_path: ctx.ledger_path.clone(),
    };

    let report = sync::pull(&remote.store, &target)?;

    if args.json {
        return print_json(&report);
    }
    println!(
        "Wrote {} issues to {} ({} dependencies on {} issues, {} comments on {} issues)",
        report.issues,
        target.ledger_path.display(),
        report.dependencies,
        report.issues_with_dependencies,
        report.comments,
        report.issues_with_comments
    );
    if let Some(backup) = &report.backup_path {
        println!("Previous ledger saved to {}", backup.display());
    }
    for warning in &report.warnings {
        eprintln!("Warning: {warning}");
    }
    Ok(())
}
