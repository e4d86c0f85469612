//! Checkpoint lookup by file, commit, commit + file, or id.
//!
//! A [`CheckpointQuery`] is chosen from the caller's inputs before any store
//! call. [`resolve`] then loads the matching checkpoint(s) together with their
//! unresolved comments and raw content.

use crate::error::{CheckpointMiss, LedgerError, Result};
use crate::model::{CheckpointComment, CheckpointRecord};
use crate::review::content::ContentFetcher;
use crate::storage::ReviewStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Raw lookup inputs. Blank strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub file_path: Option<String>,
    pub commit_sha: Option<String>,
    pub checkpoint_id: Option<String>,
}

/// Lookup strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointQuery {
    /// Latest checkpoint of the artifact at this path.
    ByFilePath { file_path: String },
    /// The checkpoint of this path within one commit.
    ByCommitAndFile { commit_sha: String, file_path: String },
    /// Every checkpoint of a commit.
    ByCommitOnly { commit_sha: String },
    ById { checkpoint_id: String },
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl CheckpointQuery {
    /// Pick a strategy. Commit + file beats either alone; an id is used only
    /// when neither a path nor a commit is given.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidQuery`] when no input is given.
    pub fn from_options(options: QueryOptions) -> Result<Self> {
        let file_path = present(options.file_path);
        let commit_sha = present(options.commit_sha);
        let checkpoint_id = present(options.checkpoint_id);
        match (file_path, commit_sha, checkpoint_id) {
            (Some(file_path), Some(commit_sha), _) => Ok(Self::ByCommitAndFile {
                commit_sha,
                file_path,
            }),
            (Some(file_path), None, _) => Ok(Self::ByFilePath { file_path }),
            (None, Some(commit_sha), _) => Ok(Self::ByCommitOnly { commit_sha }),
            (None, None, Some(checkpoint_id)) => Ok(Self::ById { checkpoint_id }),
            (None, None, None) => Err(LedgerError::InvalidQuery(
                "provide a file path, a commit SHA (optionally with a file path), or a checkpoint id"
                    .to_string(),
            )),
        }
    }

    /// Whether this strategy yields a list rather than one checkpoint.
    #[must_use]
    pub const fn is_multi(&self) -> bool {
        matches!(self, Self::ByCommitOnly { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointSummary {
    pub id: String,
    pub git_commit_sha: String,
    pub git_branch: Option<String>,
    pub git_blob_url: Option<String>,
    pub git_raw_url: String,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    pub file_path: Option<String>,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentSummary {
    pub id: String,
    pub content: String,
    pub line_start: i64,
    pub line_end: i64,
    pub author_name: Option<String>,
    pub author_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CheckpointComment> for CommentSummary {
    fn from(comment: CheckpointComment) -> Self {
        Self {
            id: comment.id,
            content: comment.content,
            line_start: comment.line_start,
            line_end: comment.line_end,
            author_name: comment.author_name,
            author_id: comment.author_id,
            created_at: comment.created_at,
        }
    }
}

/// A checkpoint with everything a reviser needs: its comments in line order
/// and the file content they refer to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointBundle {
    pub checkpoint: CheckpointSummary,
    pub artifact: ArtifactSummary,
    pub comments: Vec<CommentSummary>,
    pub content: String,
}

/// Single-checkpoint or multi-checkpoint result. Serializes as an object or
/// an array respectively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Resolution {
    Single(CheckpointBundle),
    Multiple(Vec<CheckpointBundle>),
}

impl Resolution {
    /// All bundles, whichever shape the result has.
    #[must_use]
    pub fn bundles(&self) -> &[CheckpointBundle] {
        match self {
            Self::Single(bundle) => std::slice::from_ref(bundle),
            Self::Multiple(bundles) => bundles,
        }
    }
}

/// Build the query from raw options and resolve it.
///
/// # Errors
///
/// See [`CheckpointQuery::from_options`] and [`resolve`].
pub fn query(
    store: &impl ReviewStore,
    fetcher: &impl ContentFetcher,
    options: QueryOptions,
) -> Result<Resolution> {
    let query = CheckpointQuery::from_options(options)?;
    resolve(store, fetcher, &query)
}

/// Resolve a checkpoint query.
///
/// In single mode a failure to load comments or content is fatal. In multi
/// mode such a checkpoint is logged and left out.
///
/// # Errors
///
/// Returns [`LedgerError::CheckpointNotFound`] when nothing matches, and any
/// store or content error in single mode.
pub fn resolve(
    store: &impl ReviewStore,
    fetcher: &impl ContentFetcher,
    query: &CheckpointQuery,
) -> Result<Resolution> {
    debug!(?query, "Resolving checkpoint");
    match query {
        CheckpointQuery::ByFilePath { file_path } => {
            let checkpoint = store.latest_checkpoint_for_file(file_path)?.ok_or_else(|| {
                CheckpointMiss::FilePath {
                    file_path: file_path.clone(),
                }
            })?;
            log_found(&checkpoint);
            bundle(store, fetcher, checkpoint, Some(file_path)).map(Resolution::Single)
        }
        CheckpointQuery::ByCommitAndFile {
            commit_sha,
            file_path,
        } => {
            let mut checkpoints = commit_checkpoints(store, commit_sha)?;
            let Some(position) = checkpoints
                .iter()
                .position(|checkpoint| checkpoint.file_path() == Some(file_path.as_str()))
            else {
                let available = checkpoints
                    .iter()
                    .map(|checkpoint| {
                        format!(
                            "{} (checkpoint: {})",
                            checkpoint.file_path().unwrap_or("no artifact"),
                            checkpoint.short_id()
                        )
                    })
                    .collect();
                return Err(CheckpointMiss::FileInCommit {
                    file_path: file_path.clone(),
                    commit_sha: commit_sha.clone(),
                    available,
                }
                .into());
            };
            let checkpoint = checkpoints.swap_remove(position);
            log_found(&checkpoint);
            bundle(store, fetcher, checkpoint, Some(file_path)).map(Resolution::Single)
        }
        CheckpointQuery::ByCommitOnly { commit_sha } => {
            let checkpoints = commit_checkpoints(store, commit_sha)?;
            info!(
                count = checkpoints.len(),
                commit = %commit_sha,
                "Processing checkpoints from commit"
            );
            let mut bundles = Vec::with_capacity(checkpoints.len());
            for checkpoint in checkpoints {
                let id = checkpoint.id.clone();
                let file_path = checkpoint.file_path().map(str::to_string);
                match bundle(store, fetcher, checkpoint, None) {
                    Ok(bundle) => bundles.push(bundle),
                    Err(err) => {
                        warn!(
                            checkpoint_id = %id,
                            file_path = ?file_path,
                            %err,
                            "Skipping checkpoint"
                        );
                    }
                }
            }
            Ok(Resolution::Multiple(bundles))
        }
        CheckpointQuery::ById { checkpoint_id } => {
            let checkpoint = store
                .checkpoint_by_id(checkpoint_id)?
                .ok_or_else(|| CheckpointMiss::Id {
                    checkpoint_id: checkpoint_id.clone(),
                })?;
            log_found(&checkpoint);
            bundle(store, fetcher, checkpoint, None).map(Resolution::Single)
        }
    }
}

fn commit_checkpoints(
    store: &impl ReviewStore,
    commit_sha: &str,
) -> Result<Vec<CheckpointRecord>> {
    let checkpoints = store.checkpoints_for_commit(commit_sha)?;
    if checkpoints.is_empty() {
        return Err(CheckpointMiss::Commit {
            commit_sha: commit_sha.to_string(),
        }
        .into());
    }
    Ok(checkpoints)
}

fn log_found(checkpoint: &CheckpointRecord) {
    info!(
        checkpoint_id = %checkpoint.id,
        branch = checkpoint.git_branch.as_deref().unwrap_or_default(),
        commit = checkpoint.short_sha(),
        "Found checkpoint"
    );
    if let Some(change) = &checkpoint.change {
        info!(
            change_id = %change.id,
            branch = change.branch_name.as_deref().unwrap_or_default(),
            status = change.status.as_deref().unwrap_or_default(),
            "Checkpoint belongs to a change"
        );
    } else if let Some(artifact) = &checkpoint.artifact {
        info!(
            artifact_id = artifact.id.as_deref().unwrap_or_default(),
            "Checkpoint belongs to an artifact"
        );
    }
}

fn bundle(
    store: &impl ReviewStore,
    fetcher: &impl ContentFetcher,
    checkpoint: CheckpointRecord,
    requested_path: Option<&str>,
) -> Result<CheckpointBundle> {
    let mut comments = store.unresolved_checkpoint_comments(&checkpoint.id)?;
    comments.sort_by_key(|comment| comment.line_start);
    debug!(
        checkpoint_id = %checkpoint.id,
        comments = comments.len(),
        "Fetched unresolved comments"
    );

    let content = fetcher.fetch(&checkpoint.git_raw_url)?;

    let artifact = ArtifactSummary {
        file_path: checkpoint
            .file_path()
            .map(str::to_string)
            .or_else(|| requested_path.map(str::to_string)),
        project_id: checkpoint
            .artifact
            .as_ref()
            .and_then(|artifact| artifact.project_id.clone()),
    };

    Ok(CheckpointBundle {
        checkpoint: CheckpointSummary {
            id: checkpoint.id,
            git_commit_sha: checkpoint.git_commit_sha,
            git_branch: checkpoint.git_branch,
            git_blob_url: checkpoint.git_blob_url,
            git_raw_url: checkpoint.git_raw_url,
            author_name: checkpoint.author_name,
            author_email: checkpoint.author_email,
            message: checkpoint.message,
            created_at: checkpoint.created_at,
        },
        artifact,
        comments: comments.into_iter().map(CommentSummary::from).collect(),
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(file: Option<&str>, commit: Option<&str>, id: Option<&str>) -> QueryOptions {
        QueryOptions {
            file_path: file.map(str::to_string),
            commit_sha: commit.map(str::to_string),
            checkpoint_id: id.map(str::to_string),
        }
    }

    #[test]
    fn strategy_precedence() {
        assert!(matches!(
            CheckpointQuery::from_options(options(Some("a.md"), Some("abc"), Some("id"))).unwrap(),
            CheckpointQuery::ByCommitAndFile { .. }
        ));
        assert!(matches!(
            CheckpointQuery::from_options(options(Some("a.md"), None, Some("id"))).unwrap(),
            CheckpointQuery::ByFilePath { .. }
        ));
        assert!(matches!(
            CheckpointQuery::from_options(options(None, Some("abc"), Some("id"))).unwrap(),
            CheckpointQuery::ByCommitOnly { .. }
        ));
        assert!(matches!(
            CheckpointQuery::from_options(options(None, None, Some("id"))).unwrap(),
            CheckpointQuery::ById { .. }
        ));
    }

    #[test]
    fn blank_inputs_are_absent() {
        let err = CheckpointQuery::from_options(options(Some(""), Some("  "), None)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuery(_)));
        assert!(matches!(
            CheckpointQuery::from_options(options(Some(" "), Some("abc"), None)).unwrap(),
            CheckpointQuery::ByCommitOnly { .. }
        ));
    }

    #[test]
    fn only_commit_only_is_multi() {
        let query = CheckpointQuery::ByCommitOnly {
            commit_sha: "abc".to_string(),
        };
        assert!(query.is_multi());
        let query = CheckpointQuery::ById {
            checkpoint_id: "x".to_string(),
        };
        assert!(!query.is_multi());
    }
}
