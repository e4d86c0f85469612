//! Ledger -> remote idempotent upsert.

use crate::error::{LedgerError, Result};
use crate::model::Issue;
use crate::storage::{InsertOutcome, RemoteIssueStore};
use crate::sync::{SyncTarget, read_ledger};
use serde::Serialize;
use tracing::{debug, info, warn};

/// An issue whose upsert failed. Its dependencies and comments were skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueFailure {
    pub issue_id: String,
    pub message: String,
}

/// What happened to one ledger issue, in ledger order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum IssueOutcome {
    Synced {
        issue_id: String,
        dependencies_applied: usize,
        comments_inserted: usize,
        comments_duplicate: usize,
    },
    Failed {
        issue_id: String,
        message: String,
    },
}

/// Summary of a completed push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub project_id: String,
    pub issues_total: usize,
    pub issues_synced: usize,
    pub failures: Vec<IssueFailure>,
    pub dependencies_applied: usize,
    pub dependency_failures: usize,
    pub comments_inserted: usize,
    pub comments_duplicate: usize,
    pub comment_failures: usize,
    /// Remote issue count after the push, if the count query succeeded.
    pub remote_issue_count: Option<usize>,
    pub count_matches: bool,
    pub outcomes: Vec<IssueOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Upsert every ledger issue, then its dependencies and comments.
///
/// Issues are processed one at a time in ledger order. A failed issue upsert
/// is recorded and its relations are skipped; failed dependency or comment
/// writes are counted as warnings. Comments the store already has count as
/// duplicates, not failures.
///
/// # Errors
///
/// Returns [`LedgerError::LedgerNotFound`] or
/// [`LedgerError::MalformedRecord`] for an unreadable ledger, and
/// [`LedgerError::ProjectNotFound`] if the project does not exist.
pub fn push(store: &impl RemoteIssueStore, target: &SyncTarget) -> Result<PushReport> {
    let issues = read_ledger(&target.ledger_path)?;
    let project = store
        .find_project(&target.repo_owner, &target.repo_name)?
        .ok_or_else(|| LedgerError::ProjectNotFound {
            owner: target.repo_owner.clone(),
            name: target.repo_name.clone(),
        })?;
    info!(
        project = %project.slug(),
        issues = issues.len(),
        "Pushing ledger"
    );

    let mut report = PushReport {
        project_id: project.id.clone(),
        issues_total: issues.len(),
        ..PushReport::default()
    };

    for issue in &issues {
        let outcome = push_issue(store, &project.id, issue, &mut report);
        report.outcomes.push(outcome);
    }

    match store.count_issues(&project.id) {
        Ok(count) => {
            report.remote_issue_count = Some(count);
            report.count_matches = count == report.issues_total;
            if !report.count_matches {
                warn!(
                    remote = count,
                    local = report.issues_total,
                    "Remote issue count differs from ledger"
                );
            }
        }
        Err(err) => {
            warn!(%err, "Could not verify remote issue count");
            report
                .warnings
                .push(format!("Could not verify remote issue count: {err}"));
        }
    }

    info!(
        synced = report.issues_synced,
        failed = report.failures.len(),
        dependencies = report.dependencies_applied,
        comments = report.comments_inserted,
        duplicates = report.comments_duplicate,
        "Push complete"
    );
    Ok(report)
}

fn push_issue(
    store: &impl RemoteIssueStore,
    project_id: &str,
    issue: &Issue,
    report: &mut PushReport,
) -> IssueOutcome {
    if let Err(err) = store.upsert_issue(project_id, issue) {
        warn!(issue_id = %issue.id, %err, "Failed to upsert issue");
        let message = err.to_string();
        report.failures.push(IssueFailure {
            issue_id: issue.id.clone(),
            message: message.clone(),
        });
        return IssueOutcome::Failed {
            issue_id: issue.id.clone(),
            message,
        };
    }
    report.issues_synced += 1;

    let mut dependencies_applied = 0;
    for dependency in &issue.dependencies {
        match store.upsert_dependency(project_id, dependency) {
            Ok(()) => dependencies_applied += 1,
            Err(err) => {
                warn!(
                    issue_id = %issue.id,
                    depends_on_id = %dependency.depends_on_id,
                    %err,
                    "Failed to upsert dependency"
                );
                report.dependency_failures += 1;
                report.warnings.push(format!(
                    "Dependency {} -> {}: {err}",
                    issue.id, dependency.depends_on_id
                ));
            }
        }
    }

    let mut comments_inserted = 0;
    let mut comments_duplicate = 0;
    for comment in &issue.comments {
        match store.insert_comment(project_id, comment) {
            Ok(InsertOutcome::Inserted) => comments_inserted += 1,
            Ok(InsertOutcome::Duplicate) => {
                debug!(issue_id = %issue.id, "Comment already present");
                comments_duplicate += 1;
            }
            Err(err) => {
                warn!(issue_id = %issue.id, %err, "Failed to insert comment");
                report.comment_failures += 1;
                report
                    .warnings
                    .push(format!("Comment on {}: {err}", issue.id));
            }
        }
    }

    report.dependencies_applied += dependencies_applied;
    report.comments_inserted += comments_inserted;
    report.comments_duplicate += comments_duplicate;
    IssueOutcome::Synced {
        issue_id: issue.id.clone(),
        dependencies_applied,
        comments_inserted,
        comments_duplicate,
    }
}
