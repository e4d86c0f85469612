//! Error types for `ledger_sync`.
//!
//! Every fatal path surfaces as a [`LedgerError`]. Degradations that the
//! synchronizers tolerate (missing dependency lists, duplicate comments) never
//! become errors; they are logged and recorded in the operation report.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

/// PostgreSQL SQLSTATE for `unique_violation`.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Top-level error type.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Missing or invalid configuration (credentials, repository info).
    #[error("{0}")]
    Config(String),

    /// A query was issued without the inputs needed to pick a strategy.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Project not found: {owner}/{name}")]
    ProjectNotFound { owner: String, name: String },

    #[error(transparent)]
    CheckpointNotFound(#[from] CheckpointMiss),

    #[error("Ledger file not found: {}", .path.display())]
    LedgerNotFound { path: PathBuf },

    /// A ledger line that is not a valid issue record.
    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// The remote store rejected or failed a request.
    #[error("Remote {operation} failed{}: {message}", status_suffix(.status, .code))]
    Remote {
        operation: String,
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    #[error("Failed to fetch content from {url}: {reason}")]
    ContentFetch { url: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn status_suffix(status: &Option<u16>, code: &Option<String>) -> String {
    match (status, code.as_deref()) {
        (Some(status), Some(code)) => format!(" (HTTP {status}, code {code})"),
        (Some(status), None) => format!(" (HTTP {status})"),
        (None, Some(code)) => format!(" (code {code})"),
        (None, None) => String::new(),
    }
}

impl LedgerError {
    /// Build a remote error without HTTP details (used by non-HTTP stores).
    pub fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            operation: operation.into(),
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// True when the store refused an insert because of a unique constraint.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Remote { code: Some(code), .. } if code == UNIQUE_VIOLATION)
    }
}

/// Why a checkpoint lookup came back empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckpointMiss {
    #[error(
        "No checkpoint found for file: {file_path}. The file may not have been published yet, \
         or a background import is still processing it."
    )]
    FilePath { file_path: String },

    #[error(
        "No checkpoints found for commit SHA: {commit_sha}. A background import may still be \
         processing this commit (retry in a minute or two)."
    )]
    Commit { commit_sha: String },

    #[error("{}", file_in_commit_message(.file_path, .commit_sha, .available))]
    FileInCommit {
        file_path: String,
        commit_sha: String,
        /// File paths (with short checkpoint ids) present in the commit.
        available: Vec<String>,
    },

    #[error("Checkpoint not found: {checkpoint_id}")]
    Id { checkpoint_id: String },
}

fn file_in_commit_message(file_path: &str, commit_sha: &str, available: &[String]) -> String {
    let mut message =
        format!("No checkpoint found for file \"{file_path}\" in commit {commit_sha}");
    if !available.is_empty() {
        message.push_str(". Files in this commit: ");
        message.push_str(&available.join(", "));
    }
    message
}
