//! Unresolved review comment queries and bulk resolution.

use crate::error::{LedgerError, Result};
use crate::model::{ChangeComments, ReviewComment};
use crate::storage::{RemoteIssueStore, ReviewStore};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Result of a bulk resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolveReport {
    pub success: bool,
    pub resolved: usize,
}

/// Unresolved comments on any file under `prefix`, across all changes.
///
/// The joined change/spec/project form is tried first. If the store cannot
/// serve it, the plain rows are returned instead.
///
/// # Errors
///
/// Returns the error of the plain query when both queries fail.
pub fn by_path_prefix(store: &impl ReviewStore, prefix: &str) -> Result<Vec<ReviewComment>> {
    info!(prefix, "Searching for review comments");
    let comments = match store.review_comments_by_prefix(prefix, true) {
        Ok(comments) => comments,
        Err(err) => {
            warn!(%err, "Enriched review comment query failed; retrying without joins");
            store.review_comments_by_prefix(prefix, false)?
        }
    };
    info!(count = comments.len(), "Found unresolved review comments");
    Ok(comments)
}

/// Unresolved comments of one change, ordered by file path then start line.
///
/// # Errors
///
/// Returns an error if the store cannot be queried.
pub fn by_change(store: &impl ReviewStore, change_id: &str) -> Result<Vec<ReviewComment>> {
    let comments = store.unresolved_review_comments_for_change(change_id)?;
    debug!(change_id, count = comments.len(), "Fetched review comments for change");
    Ok(comments)
}

/// Unresolved comments of every open change in a project, grouped by change.
/// Changes without unresolved comments are left out, and so are changes whose
/// comments cannot be fetched.
///
/// # Errors
///
/// Returns [`LedgerError::ProjectNotFound`] for an unknown project and any
/// error looking up the project, its specs or its open changes.
pub fn by_project<S>(store: &S, owner: &str, name: &str) -> Result<Vec<ChangeComments>>
where
    S: RemoteIssueStore + ReviewStore,
{
    let project = store
        .find_project(owner, name)?
        .ok_or_else(|| LedgerError::ProjectNotFound {
            owner: owner.to_string(),
            name: name.to_string(),
        })?;

    let specs = store.specs_for_project(&project.id)?;
    if specs.is_empty() {
        info!(project = %project.slug(), "No specs found for project");
        return Ok(Vec::new());
    }
    let spec_ids: Vec<String> = specs.into_iter().map(|spec| spec.id).collect();

    let changes = store.open_changes_for_specs(&spec_ids)?;
    if changes.is_empty() {
        info!(project = %project.slug(), "No open changes found");
        return Ok(Vec::new());
    }

    let mut grouped = Vec::new();
    for change in changes {
        let comments = match by_change(store, &change.id) {
            Ok(comments) => comments,
            Err(err) => {
                warn!(
                    change_id = %change.id,
                    %err,
                    "Skipping change whose comments could not be fetched"
                );
                continue;
            }
        };
        if !comments.is_empty() {
            grouped.push(ChangeComments { change, comments });
        }
    }
    info!(changes = grouped.len(), "Collected review comments for project");
    Ok(grouped)
}

fn require_ids(ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Err(LedgerError::InvalidQuery(
            "at least one comment id is required".to_string(),
        ));
    }
    Ok(())
}

/// Mark checkpoint comments resolved in one batch.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidQuery`] for an empty id list and any store
/// error; a failed batch resolves nothing.
pub fn resolve(store: &impl ReviewStore, ids: &[String]) -> Result<ResolveReport> {
    require_ids(ids)?;
    info!(count = ids.len(), "Marking comments as resolved");
    let resolved = store.resolve_checkpoint_comments(ids)?;
    Ok(ResolveReport {
        success: true,
        resolved,
    })
}

/// Mark change-level review comments resolved in one batch.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidQuery`] for an empty id list and any store
/// error.
pub fn resolve_review(store: &impl ReviewStore, ids: &[String]) -> Result<ResolveReport> {
    require_ids(ids)?;
    info!(count = ids.len(), "Marking review comments as resolved");
    let resolved = store.resolve_review_comments(ids)?;
    Ok(ResolveReport {
        success: true,
        resolved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn empty_resolve_is_invalid_without_store_calls() {
        let store = MemoryStore::new();
        assert!(matches!(
            resolve(&store, &[]),
            Err(LedgerError::InvalidQuery(_))
        ));
        assert!(matches!(
            resolve_review(&store, &[]),
            Err(LedgerError::InvalidQuery(_))
        ));
        assert_eq!(store.calls(), 0);
    }

    #[test]
    fn unknown_project_is_not_found() {
        let store = MemoryStore::new();
        let err = by_project(&store, "acme", "widgets").unwrap_err();
        assert_eq!(err.to_string(), "Project not found: acme/widgets");
    }

    #[test]
    fn project_without_specs_is_empty() {
        let store = MemoryStore::new();
        store.add_project("acme", "widgets");
        assert!(by_project(&store, "acme", "widgets").unwrap().is_empty());
    }

    #[test]
    fn resolve_report_serializes_like_cli_output() {
        let report = ResolveReport {
            success: true,
            resolved: 2,
        };
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"success":true,"resolved":2}"#
        );
    }
}
