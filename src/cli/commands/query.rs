//! Query command implementation.

use crate::cli::commands::{connect, print_json};
use crate::cli::{CommandContext, QueryArgs};
use crate::error::Result;
use crate::review::{self, CheckpointQuery, HttpContentFetcher, QueryOptions};

/// Execute the query command. The query is validated before any
/// configuration is loaded.
///
/// # Errors
///
/// Returns an error for an empty query, incomplete configuration, or a
/// failed lookup.
pub fn execute(args: &QueryArgs, ctx: &CommandContext) -> Result<()> {
    let query = CheckpointQuery::from_options(QueryOptions {
        file_path: args.file_path.clone(),
        commit_sha: args.commit_sha.clone(),
        checkpoint_id: args.checkpoint_id.clone(),
    })?;

    let remote = connect(ctx, &args.remote)?;
    let fetcher = HttpContentFetcher::new(remote.settings.timeout)?;
    let resolution = review::resolve(&remote.store, &fetcher, &query)?;
    print_json(&resolution)
}
