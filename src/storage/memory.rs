//! In-memory store for tests and offline callers.
//!
//! Honors the same uniqueness keys and orderings as the REST store. Faults can
//! be injected per operation and every trait call is counted.

use crate::error::{LedgerError, Result};
use crate::model::{
    Change, ChangeContext, CheckpointComment, CheckpointRecord, Comment, CommentId, Dependency,
    Issue, Project, ProjectRef, ReviewComment, Spec, SpecContext,
};
use crate::storage::{InsertOutcome, RemoteIssueStore, ReviewStore};
use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Operation that should fail on the next (and every later) call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fault {
    ListIssues,
    ListDependencies,
    ListComments,
    CountIssues,
    /// Upserting the issue with this id.
    UpsertIssue(String),
    /// Upserting any dependency of the issue with this id.
    UpsertDependency(String),
    /// Inserting any comment of the issue with this id.
    InsertComment(String),
    /// Listing comments of the checkpoint with this id.
    CheckpointComments(String),
    CheckpointsForCommit,
    EnrichedReviewComments,
    FlatReviewComments,
    /// Listing review comments of the change with this id.
    ChangeReviewComments(String),
    ResolveComments,
    ResolveReviewComments,
}

/// Thread-safe in-memory implementation of both store traits.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    calls: usize,
    faults: HashSet<Fault>,
    projects: Vec<Project>,
    issues: Vec<(String, Issue)>,
    dependencies: Vec<(String, Dependency)>,
    comments: Vec<(String, Comment)>,
    next_comment_id: i64,
    checkpoints: Vec<CheckpointRecord>,
    checkpoint_comments: Vec<CheckpointComment>,
    review_comments: Vec<ReviewComment>,
    specs: Vec<Spec>,
    changes: Vec<Change>,
}

impl MemoryState {
    fn check(&self, fault: &Fault, operation: &str) -> Result<()> {
        if self.faults.contains(fault) {
            return Err(LedgerError::remote(operation, "injected failure"));
        }
        Ok(())
    }

    fn change_context(&self, change_id: &str) -> Option<ChangeContext> {
        let change = self.changes.iter().find(|change| change.id == change_id)?;
        let spec = self.specs.iter().find(|spec| spec.id == change.spec_id)?;
        let spec_project_id = spec.project_id.clone()?;
        let project = self
            .projects
            .iter()
            .find(|project| project.id == spec_project_id)?;
        Some(ChangeContext {
            id: change.id.clone(),
            head_branch: change.head_branch.clone(),
            base_branch: change.base_branch.clone(),
            state: change.state.clone(),
            spec_id: change.spec_id.clone(),
            spec: Some(SpecContext {
                spec_key: spec.spec_key.clone(),
                project_id: spec_project_id,
                project: Some(ProjectRef {
                    repo_owner: project.repo_owner.clone(),
                    repo_name: project.repo_name.clone(),
                }),
            }),
        })
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|err| LedgerError::remote("memory store", err.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|err| LedgerError::remote("memory store", err.to_string()))
    }

    /// Lock for a trait call, counting it.
    fn call(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        let mut state = self.write()?;
        state.calls += 1;
        Ok(state)
    }

    /// Number of store trait calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.read().map_or(0, |state| state.calls)
    }

    /// Make an operation fail from now on.
    pub fn inject(&self, fault: Fault) {
        if let Ok(mut state) = self.write() {
            state.faults.insert(fault);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut state) = self.write() {
            state.faults.clear();
        }
    }

    /// Register a project and return it. Ids are assigned sequentially.
    pub fn add_project(&self, owner: &str, name: &str) -> Project {
        let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let project = Project {
            id: format!("project-{}", state.projects.len() + 1),
            repo_owner: owner.to_string(),
            repo_name: name.to_string(),
        };
        state.projects.push(project.clone());
        project
    }

    /// Seed an issue with its nested dependencies and comments, bypassing
    /// call counting and faults.
    pub fn seed_issue(&self, project_id: &str, issue: &Issue) {
        let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        upsert_issue_row(&mut state, project_id, issue);
        for dependency in &issue.dependencies {
            upsert_dependency_row(&mut state, project_id, dependency);
        }
        for comment in &issue.comments {
            insert_comment_row(&mut state, project_id, comment);
        }
    }

    pub fn add_checkpoint(&self, checkpoint: CheckpointRecord) {
        self.mutate(|state| state.checkpoints.push(checkpoint));
    }

    pub fn add_checkpoint_comment(&self, comment: CheckpointComment) {
        self.mutate(|state| state.checkpoint_comments.push(comment));
    }

    pub fn add_spec(&self, spec: Spec) {
        self.mutate(|state| state.specs.push(spec));
    }

    pub fn add_change(&self, change: Change) {
        self.mutate(|state| state.changes.push(change));
    }

    pub fn add_review_comment(&self, comment: ReviewComment) {
        self.mutate(|state| state.review_comments.push(comment));
    }

    fn mutate(&self, apply: impl FnOnce(&mut MemoryState)) {
        let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        apply(&mut state);
    }

    /// Stored issues of a project in insertion order, without relations.
    #[must_use]
    pub fn stored_issues(&self, project_id: &str) -> Vec<Issue> {
        self.read().map_or_else(
            |_| Vec::new(),
            |state| {
                state
                    .issues
                    .iter()
                    .filter(|(project, _)| project == project_id)
                    .map(|(_, issue)| issue.clone())
                    .collect()
            },
        )
    }

    #[must_use]
    pub fn dependency_count(&self, project_id: &str) -> usize {
        self.read().map_or(0, |state| {
            state
                .dependencies
                .iter()
                .filter(|(project, _)| project == project_id)
                .count()
        })
    }

    #[must_use]
    pub fn comment_count(&self, project_id: &str) -> usize {
        self.read().map_or(0, |state| {
            state
                .comments
                .iter()
                .filter(|(project, _)| project == project_id)
                .count()
        })
    }

    #[must_use]
    pub fn checkpoint_comment(&self, id: &str) -> Option<CheckpointComment> {
        self.read()
            .ok()?
            .checkpoint_comments
            .iter()
            .find(|comment| comment.id == id)
            .cloned()
    }

    #[must_use]
    pub fn review_comment(&self, id: &str) -> Option<ReviewComment> {
        self.read()
            .ok()?
            .review_comments
            .iter()
            .find(|comment| comment.id == id)
            .cloned()
    }
}

fn upsert_issue_row(state: &mut MemoryState, project_id: &str, issue: &Issue) {
    let row = issue.without_relations();
    match state
        .issues
        .iter_mut()
        .find(|(project, stored)| project == project_id && stored.id == issue.id)
    {
        Some((_, stored)) => *stored = row,
        None => state.issues.push((project_id.to_string(), row)),
    }
}

fn upsert_dependency_row(state: &mut MemoryState, project_id: &str, dependency: &Dependency) {
    match state
        .dependencies
        .iter_mut()
        .find(|(project, stored)| project == project_id && stored.key() == dependency.key())
    {
        Some((_, stored)) => *stored = dependency.clone(),
        None => state
            .dependencies
            .push((project_id.to_string(), dependency.clone())),
    }
}

fn insert_comment_row(
    state: &mut MemoryState,
    project_id: &str,
    comment: &Comment,
) -> InsertOutcome {
    let duplicate = state.comments.iter().any(|(project, stored)| {
        project == project_id
            && stored.issue_id == comment.issue_id
            && stored.author == comment.author
            && stored.text == comment.text
            && stored.created_at == comment.created_at
    });
    if duplicate {
        return InsertOutcome::Duplicate;
    }
    state.next_comment_id += 1;
    let mut row = comment.clone();
    row.id = Some(CommentId::Number(state.next_comment_id));
    state.comments.push((project_id.to_string(), row));
    InsertOutcome::Inserted
}

impl RemoteIssueStore for MemoryStore {
    fn find_project(&self, owner: &str, name: &str) -> Result<Option<Project>> {
        let state = self.call()?;
        Ok(state
            .projects
            .iter()
            .find(|project| project.repo_owner == owner && project.repo_name == name)
            .cloned())
    }

    fn list_issues(&self, project_id: &str) -> Result<Vec<Issue>> {
        let state = self.call()?;
        state.check(&Fault::ListIssues, "list bd_issues")?;
        let mut issues: Vec<Issue> = state
            .issues
            .iter()
            .filter(|(project, _)| project == project_id)
            .map(|(_, issue)| issue.clone())
            .collect();
        issues.sort_by_key(|issue| issue.created_at);
        Ok(issues)
    }

    fn list_dependencies(&self, project_id: &str) -> Result<Vec<Dependency>> {
        let state = self.call()?;
        state.check(&Fault::ListDependencies, "list bd_dependencies")?;
        Ok(state
            .dependencies
            .iter()
            .filter(|(project, _)| project == project_id)
            .map(|(_, dependency)| dependency.clone())
            .collect())
    }

    fn list_comments(&self, project_id: &str) -> Result<Vec<Comment>> {
        let state = self.call()?;
        state.check(&Fault::ListComments, "list bd_comments")?;
        let mut comments: Vec<Comment> = state
            .comments
            .iter()
            .filter(|(project, _)| project == project_id)
            .map(|(_, comment)| comment.clone())
            .collect();
        comments.sort_by_key(|comment| comment.created_at);
        Ok(comments)
    }

    fn count_issues(&self, project_id: &str) -> Result<usize> {
        let state = self.call()?;
        state.check(&Fault::CountIssues, "count bd_issues")?;
        Ok(state
            .issues
            .iter()
            .filter(|(project, _)| project == project_id)
            .count())
    }

    fn upsert_issue(&self, project_id: &str, issue: &Issue) -> Result<()> {
        let mut state = self.call()?;
        state.check(&Fault::UpsertIssue(issue.id.clone()), "upsert bd_issues")?;
        upsert_issue_row(&mut state, project_id, issue);
        Ok(())
    }

    fn upsert_dependency(&self, project_id: &str, dependency: &Dependency) -> Result<()> {
        let mut state = self.call()?;
        state.check(
            &Fault::UpsertDependency(dependency.issue_id.clone()),
            "upsert bd_dependencies",
        )?;
        upsert_dependency_row(&mut state, project_id, dependency);
        Ok(())
    }

    fn insert_comment(&self, project_id: &str, comment: &Comment) -> Result<InsertOutcome> {
        let mut state = self.call()?;
        state.check(
            &Fault::InsertComment(comment.issue_id.clone()),
            "insert bd_comments",
        )?;
        Ok(insert_comment_row(&mut state, project_id, comment))
    }
}

impl ReviewStore for MemoryStore {
    fn latest_checkpoint_for_file(&self, file_path: &str) -> Result<Option<CheckpointRecord>> {
        let state = self.call()?;
        // max_by_key keeps the last maximum, so later inserts win ties.
        Ok(state
            .checkpoints
            .iter()
            .filter(|checkpoint| checkpoint.file_path() == Some(file_path))
            .max_by_key(|checkpoint| checkpoint.created_at)
            .cloned())
    }

    fn checkpoints_for_commit(&self, commit_sha: &str) -> Result<Vec<CheckpointRecord>> {
        let state = self.call()?;
        state.check(&Fault::CheckpointsForCommit, "checkpoints for commit")?;
        let mut checkpoints: Vec<CheckpointRecord> = state
            .checkpoints
            .iter()
            .filter(|checkpoint| checkpoint.git_commit_sha == commit_sha)
            .cloned()
            .collect();
        checkpoints.sort_by_key(|checkpoint| checkpoint.created_at);
        Ok(checkpoints)
    }

    fn checkpoint_by_id(&self, checkpoint_id: &str) -> Result<Option<CheckpointRecord>> {
        let state = self.call()?;
        Ok(state
            .checkpoints
            .iter()
            .find(|checkpoint| checkpoint.id == checkpoint_id)
            .cloned())
    }

    fn unresolved_checkpoint_comments(
        &self,
        checkpoint_id: &str,
    ) -> Result<Vec<CheckpointComment>> {
        let state = self.call()?;
        state.check(
            &Fault::CheckpointComments(checkpoint_id.to_string()),
            "list checkpoint comments",
        )?;
        let mut comments: Vec<CheckpointComment> = state
            .checkpoint_comments
            .iter()
            .filter(|comment| comment.checkpoint_id == checkpoint_id && !comment.is_resolved)
            .cloned()
            .collect();
        comments.sort_by_key(|comment| comment.line_start);
        Ok(comments)
    }

    fn resolve_checkpoint_comments(&self, ids: &[String]) -> Result<usize> {
        let mut state = self.call()?;
        state.check(&Fault::ResolveComments, "resolve comments")?;
        for comment in &mut state.checkpoint_comments {
            if ids.contains(&comment.id) {
                comment.is_resolved = true;
            }
        }
        Ok(ids.len())
    }

    fn review_comments_by_prefix(
        &self,
        prefix: &str,
        enriched: bool,
    ) -> Result<Vec<ReviewComment>> {
        let state = self.call()?;
        let matching = state
            .review_comments
            .iter()
            .filter(|comment| !comment.is_resolved && comment.file_path.starts_with(prefix));
        let mut comments: Vec<ReviewComment> = if enriched {
            state.check(&Fault::EnrichedReviewComments, "review comments by path")?;
            matching
                .filter_map(|comment| {
                    let context = state.change_context(&comment.change_id)?;
                    let mut comment = comment.clone();
                    comment.change = Some(context);
                    Some(comment)
                })
                .collect()
        } else {
            state.check(&Fault::FlatReviewComments, "review comments by path")?;
            matching.cloned().collect()
        };
        comments.sort_by(|a, b| {
            a.file_path
                .cmp(&b.file_path)
                .then(a.start_line.cmp(&b.start_line))
        });
        Ok(comments)
    }

    fn unresolved_review_comments_for_change(
        &self,
        change_id: &str,
    ) -> Result<Vec<ReviewComment>> {
        let state = self.call()?;
        state.check(
            &Fault::ChangeReviewComments(change_id.to_string()),
            "review comments by change",
        )?;
        let mut comments: Vec<ReviewComment> = state
            .review_comments
            .iter()
            .filter(|comment| comment.change_id == change_id && !comment.is_resolved)
            .cloned()
            .collect();
        comments.sort_by(|a, b| {
            a.file_path
                .cmp(&b.file_path)
                .then(a.start_line.cmp(&b.start_line))
        });
        Ok(comments)
    }

    fn specs_for_project(&self, project_id: &str) -> Result<Vec<Spec>> {
        let state = self.call()?;
        Ok(state
            .specs
            .iter()
            .filter(|spec| spec.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect())
    }

    fn open_changes_for_specs(&self, spec_ids: &[String]) -> Result<Vec<Change>> {
        let state = self.call()?;
        Ok(state
            .changes
            .iter()
            .filter(|change| change.is_open() && spec_ids.contains(&change.spec_id))
            .cloned()
            .collect())
    }

    fn resolve_review_comments(&self, ids: &[String]) -> Result<usize> {
        let mut state = self.call()?;
        state.check(&Fault::ResolveReviewComments, "resolve review comments")?;
        for comment in &mut state.review_comments {
            if ids.contains(&comment.id) {
                comment.is_resolved = true;
            }
        }
        Ok(ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn dep(issue: &str, target: &str) -> Dependency {
        Dependency {
            issue_id: issue.to_string(),
            depends_on_id: target.to_string(),
            dep_type: crate::model::DependencyType::Blocks,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            created_by: "ada".to_string(),
        }
    }

    #[test]
    fn dependency_upsert_is_keyed() {
        let store = MemoryStore::new();
        let project = store.add_project("acme", "widgets");
        store.upsert_dependency(&project.id, &dep("b", "a")).unwrap();
        store.upsert_dependency(&project.id, &dep("b", "a")).unwrap();
        store.upsert_dependency(&project.id, &dep("c", "a")).unwrap();
        assert_eq!(store.dependency_count(&project.id), 2);
        assert_eq!(store.calls(), 3);
    }

    #[test]
    fn duplicate_comment_reports_duplicate() {
        let store = MemoryStore::new();
        let project = store.add_project("acme", "widgets");
        let comment = Comment {
            id: None,
            issue_id: "a".to_string(),
            author: "ada".to_string(),
            text: "hi".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        };
        assert_eq!(
            store.insert_comment(&project.id, &comment).unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_comment(&project.id, &comment).unwrap(),
            InsertOutcome::Duplicate
        );
        let listed = store.list_comments(&project.id).unwrap();
        assert_eq!(listed[0].id, Some(CommentId::Number(1)));
    }

    #[test]
    fn injected_fault_fails_operation() {
        let store = MemoryStore::new();
        let project = store.add_project("acme", "widgets");
        store.inject(Fault::ListDependencies);
        let err = store.list_dependencies(&project.id).unwrap_err();
        assert!(err.to_string().contains("injected failure"));
        store.clear_faults();
        assert!(store.list_dependencies(&project.id).unwrap().is_empty());
    }

    #[test]
    fn seeding_does_not_count_calls() {
        let store = MemoryStore::new();
        let project = store.add_project("acme", "widgets");
        let mut issue = Issue::new("a", "A", Utc::now());
        issue.dependencies.push(dep("a", "b"));
        store.seed_issue(&project.id, &issue);
        assert_eq!(store.calls(), 0);
        assert_eq!(store.stored_issues(&project.id).len(), 1);
        assert!(store.stored_issues(&project.id)[0].dependencies.is_empty());
    }
}
