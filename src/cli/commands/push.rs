//! Push command implementation.

use crate::cli::commands::{connect, print_json};
use crate::cli::{CommandContext, SyncArgs};
use crate::config::RepoCoordinates;
use crate::error::Result;
use crate::sync::{self, SyncTarget};

/// Execute the push command.
///
/// Per-issue failures do not fail the command; they are listed in the report.
///
/// # Errors
///
/// Returns an error if configuration is incomplete, the ledger cannot be
/// read, or the project does not exist.
pub fn execute(args: &SyncArgs, ctx: &CommandContext) -> Result<()> {
    let remote = connect(ctx, &args.remote)?;
    let repo = RepoCoordinates::from_layer(&remote.layer)?;
    let target = SyncTarget {
        repo_owner: repo.owner,
        repo_name: repo.name,
        ledger_path: ctx.ledger_path.clone(),
    };

    let report = sync::push(&remote.store, &target)?;

    if args.json {
        return print_json(&report);
    }
    println!(
        "Synced {}/{} issues ({} dependencies, {} new comments, {} already present)",
        report.issues_synced,
        report.issues_total,
        report.dependencies_applied,
        report.comments_inserted,
        report.comments_duplicate
    );
    match report.remote_issue_count {
        Some(count) if report.count_matches => println!("Remote has {count} issues"),
        Some(count) => println!(
            "Remote has {count} issues, ledger has {}",
            report.issues_total
        ),
        None => {}
    }
    for failure in &report.failures {
        eprintln!("Failed: {}: {}", failure.issue_id, failure.message);
    }
    for warning in &report.warnings {
        eprintln!("Warning: {warning}");
    }
    Ok(())
}
