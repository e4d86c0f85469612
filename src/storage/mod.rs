//! Remote store access for `ledger_sync`.
//!
//! The remote relational store is reached through two capability traits that
//! are passed explicitly into every operation:
//!
//! - [`RemoteIssueStore`] - projects, issues, dependencies, issue comments
//! - [`ReviewStore`] - checkpoints, checkpoint comments, change review comments
//!
//! # Submodules
//!
//! - [`rest`] - PostgREST implementation over blocking HTTP
//! - [`memory`] - In-memory implementation with the same keys and ordering
//! - [`query`] - PostgREST filter/order query builder

pub mod memory;
pub mod query;
pub mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use crate::error::Result;
use crate::model::{
    Change, CheckpointComment, CheckpointRecord, Comment, Dependency, Issue, Project,
    ReviewComment, Spec,
};

/// Outcome of an append-only comment insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The store already had this comment; treated as success.
    Duplicate,
}

/// Typed access to the project, issue, dependency and comment tables.
///
/// List operations carry no cross-table consistency guarantee; callers join
/// the results client-side.
pub trait RemoteIssueStore {
    /// Look up a project by repository coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried. A missing project is
    /// `Ok(None)`.
    fn find_project(&self, owner: &str, name: &str) -> Result<Option<Project>>;

    /// All issues of a project ordered by `created_at` ascending, without
    /// nested dependencies or comments.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn list_issues(&self, project_id: &str) -> Result<Vec<Issue>>;

    /// All dependencies of a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn list_dependencies(&self, project_id: &str) -> Result<Vec<Dependency>>;

    /// All issue comments of a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn list_comments(&self, project_id: &str) -> Result<Vec<Comment>>;

    /// Exact number of issues stored for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn count_issues(&self, project_id: &str) -> Result<usize>;

    /// Insert or overwrite an issue keyed on `(project_id, id)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    fn upsert_issue(&self, project_id: &str, issue: &Issue) -> Result<()>;

    /// Insert or overwrite a dependency keyed on
    /// `(project_id, issue_id, depends_on_id, type)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    fn upsert_dependency(&self, project_id: &str, dependency: &Dependency) -> Result<()>;

    /// Append a comment. Duplicate-key rejections are reported as
    /// [`InsertOutcome::Duplicate`], not as errors.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than a duplicate key.
    fn insert_comment(&self, project_id: &str, comment: &Comment) -> Result<InsertOutcome>;
}

/// Typed access to checkpoints and review comments.
pub trait ReviewStore {
    /// Most recent checkpoint whose artifact has exactly this file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn latest_checkpoint_for_file(&self, file_path: &str) -> Result<Option<CheckpointRecord>>;

    /// Every checkpoint recorded for a commit, with joined artifact/change.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn checkpoints_for_commit(&self, commit_sha: &str) -> Result<Vec<CheckpointRecord>>;

    /// Direct primary-key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn checkpoint_by_id(&self, checkpoint_id: &str) -> Result<Option<CheckpointRecord>>;

    /// Unresolved comments of a checkpoint ordered by `line_start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn unresolved_checkpoint_comments(&self, checkpoint_id: &str)
    -> Result<Vec<CheckpointComment>>;

    /// Mark checkpoint comments resolved in one batch. Returns the id count.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch update fails.
    fn resolve_checkpoint_comments(&self, ids: &[String]) -> Result<usize>;

    /// Unresolved review comments whose file path starts with `prefix`.
    /// With `enriched`, each row carries its change, spec and project.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn review_comments_by_prefix(&self, prefix: &str, enriched: bool)
    -> Result<Vec<ReviewComment>>;

    /// Unresolved review comments of one change ordered by file path, then
    /// start line.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn unresolved_review_comments_for_change(&self, change_id: &str)
    -> Result<Vec<ReviewComment>>;

    /// Specs tracked for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn specs_for_project(&self, project_id: &str) -> Result<Vec<Spec>>;

    /// Open changes belonging to any of the given specs.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    fn open_changes_for_specs(&self, spec_ids: &[String]) -> Result<Vec<Change>>;

    /// Mark review comments resolved in one batch. Returns the id count.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch update fails.
    fn resolve_review_comments(&self, ids: &[String]) -> Result<usize>;
}
