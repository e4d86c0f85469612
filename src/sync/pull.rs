//! Remote -> ledger reconstruction.

use crate::error::{LedgerError, Result};
use crate::model::{Comment, Dependency, Issue};
use crate::storage::RemoteIssueStore;
use crate::sync::{SyncTarget, backup_ledger, content_hash, encode_ledger, write_ledger_atomic};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Summary of a completed pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
    pub project_id: String,
    pub issues: usize,
    pub dependencies: usize,
    pub comments: usize,
    pub issues_with_dependencies: usize,
    pub issues_with_comments: usize,
    /// Dependencies whose owning issue was not in the issue list.
    pub orphaned_dependencies: usize,
    pub orphaned_comments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    pub content_hash: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Fetch a list that the pull can live without; failures become warnings.
fn fetch_or_warn<T>(
    label: &str,
    fetched: Result<Vec<T>>,
    warnings: &mut Vec<String>,
) -> Vec<T> {
    match fetched {
        Ok(rows) => rows,
        Err(err) => {
            warn!(%err, "Could not fetch {label}; continuing without them");
            warnings.push(format!("Could not fetch {label}: {err}"));
            Vec::new()
        }
    }
}

/// Group rows by owning issue id. Rows whose issue is unknown are returned
/// separately, grouped by id, so they can be reported.
fn group_by_issue<T>(
    rows: Vec<T>,
    known: &HashSet<&str>,
    owner: impl Fn(&T) -> &str,
) -> (HashMap<String, Vec<T>>, BTreeMap<String, usize>) {
    let mut groups: HashMap<String, Vec<T>> = HashMap::new();
    let mut orphans: BTreeMap<String, usize> = BTreeMap::new();
    for row in rows {
        let issue_id = owner(&row);
        if known.contains(issue_id) {
            groups.entry(issue_id.to_string()).or_default().push(row);
        } else {
            *orphans.entry(issue_id.to_string()).or_default() += 1;
        }
    }
    (groups, orphans)
}

/// Rebuild the local ledger from the remote store.
///
/// The existing ledger, if any, is backed up before being replaced. The new
/// ledger is fully encoded before anything is written, and written atomically.
///
/// # Errors
///
/// Returns [`LedgerError::ProjectNotFound`] if the project does not exist,
/// an error if the issue list cannot be fetched, and any I/O error from the
/// backup or write. Dependency and comment fetch failures are warnings.
pub fn pull(store: &impl RemoteIssueStore, target: &SyncTarget) -> Result<PullReport> {
    let project = store
        .find_project(&target.repo_owner, &target.repo_name)?
        .ok_or_else(|| LedgerError::ProjectNotFound {
            owner: target.repo_owner.clone(),
            name: target.repo_name.clone(),
        })?;
    info!(project = %project.slug(), project_id = %project.id, "Pulling issues");

    let mut issues = store.list_issues(&project.id)?;
    let mut warnings = Vec::new();
    let dependencies = fetch_or_warn(
        "dependencies",
        store.list_dependencies(&project.id),
        &mut warnings,
    );
    let comments = fetch_or_warn("comments", store.list_comments(&project.id), &mut warnings);
    debug!(
        issues = issues.len(),
        dependencies = dependencies.len(),
        comments = comments.len(),
        "Fetched remote rows"
    );

    let known: HashSet<&str> = issues.iter().map(|issue| issue.id.as_str()).collect();
    let (mut deps_by_issue, orphan_deps) =
        group_by_issue(dependencies, &known, |dep: &Dependency| dep.issue_id.as_str());
    let (mut comments_by_issue, orphan_comments) =
        group_by_issue(comments, &known, |comment: &Comment| comment.issue_id.as_str());
    drop(known);

    for (issue_id, count) in &orphan_deps {
        warn!(%issue_id, count, "Dependencies reference an issue missing from the issue list");
    }
    for (issue_id, count) in &orphan_comments {
        warn!(%issue_id, count, "Comments reference an issue missing from the issue list");
    }

    let mut report = PullReport {
        project_id: project.id.clone(),
        issues: issues.len(),
        orphaned_dependencies: orphan_deps.values().sum(),
        orphaned_comments: orphan_comments.values().sum(),
        ..PullReport::default()
    };

    for issue in &mut issues {
        attach_relations(issue, &mut deps_by_issue, &mut comments_by_issue);
        if !issue.dependencies.is_empty() {
            report.issues_with_dependencies += 1;
            report.dependencies += issue.dependencies.len();
        }
        if !issue.comments.is_empty() {
            report.issues_with_comments += 1;
            report.comments += issue.comments.len();
        }
    }

    let text = encode_ledger(&issues)?;
    report.backup_path = backup_ledger(&target.ledger_path)?;
    write_ledger_atomic(&target.ledger_path, &text)?;
    report.content_hash = content_hash(&text);
    report.warnings = warnings;

    info!(
        issues = report.issues,
        dependencies = report.dependencies,
        comments = report.comments,
        path = %target.ledger_path.display(),
        "Pull complete"
    );
    Ok(report)
}

fn attach_relations(
    issue: &mut Issue,
    deps_by_issue: &mut HashMap<String, Vec<Dependency>>,
    comments_by_issue: &mut HashMap<String, Vec<Comment>>,
) {
    issue.dependencies = deps_by_issue.remove(&issue.id).unwrap_or_default();
    issue.comments = comments_by_issue.remove(&issue.id).unwrap_or_default();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DependencyType;
    use crate::storage::MemoryStore;
    use crate::storage::memory::Fault;
    use crate::sync::decode_ledger;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    fn target(temp: &TempDir) -> SyncTarget {
        SyncTarget {
            repo_owner: "acme".to_string(),
            repo_name: "widgets".to_string(),
            ledger_path: temp.path().join(".beads").join("issues.jsonl"),
        }
    }

    fn dep(issue: &str, target: &str) -> Dependency {
        Dependency {
            issue_id: issue.to_string(),
            depends_on_id: target.to_string(),
            dep_type: DependencyType::Blocks,
            created_at: Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap(),
            created_by: "ada".to_string(),
        }
    }

    #[test]
    fn missing_project_is_fatal_and_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let err = pull(&store, &target(&temp)).unwrap_err();
        assert!(matches!(err, LedgerError::ProjectNotFound { .. }));
        assert!(!target(&temp).ledger_path.exists());
    }

    #[test]
    fn dependency_fetch_failure_degrades_to_warning() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let project = store.add_project("acme", "widgets");
        let mut a = Issue::new("a", "A", Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        a.dependencies.push(dep("a", "b"));
        store.seed_issue(&project.id, &a);
        store.inject(Fault::ListDependencies);

        let report = pull(&store, &target(&temp)).unwrap();
        assert_eq!(report.issues, 1);
        assert_eq!(report.dependencies, 0);
        assert_eq!(report.warnings.len(), 1);

        let text = fs::read_to_string(target(&temp).ledger_path).unwrap();
        assert!(!text.contains("dependencies"));
    }

    #[test]
    fn orphaned_rows_are_counted_not_attached() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let project = store.add_project("acme", "widgets");
        let mut a = Issue::new("a", "A", Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        a.dependencies.push(dep("a", "z"));
        store.seed_issue(&project.id, &a);
        let mut ghost = Issue::new("ghost", "G", Utc::now());
        ghost.dependencies.push(dep("ghost", "a"));
        ghost.dependencies.push(dep("ghost", "z"));
        store.seed_issue("other-project", &ghost);
        store.upsert_dependency(&project.id, &dep("ghost", "a")).unwrap();

        let report = pull(&store, &target(&temp)).unwrap();
        assert_eq!(report.dependencies, 1);
        assert_eq!(report.orphaned_dependencies, 1);
        let text = fs::read_to_string(target(&temp).ledger_path).unwrap();
        let issues = decode_ledger(&text).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].dependencies.len(), 1);
    }

    #[test]
    fn empty_project_writes_single_newline() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new();
        store.add_project("acme", "widgets");
        let report = pull(&store, &target(&temp)).unwrap();
        assert_eq!(report.issues, 0);
        assert!(report.backup_path.is_none());
        assert_eq!(fs::read_to_string(target(&temp).ledger_path).unwrap(), "\n");
    }
}
