//! Review-side records: checkpoints, their comments, and change-level review
//! comments.
//!
//! Field names follow the remote column names so rows decode directly;
//! embedded (joined) relations use the table name as their JSON key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Main-line file a checkpoint belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    #[serde(default)]
    pub id: Option<String>,
    pub file_path: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Feature-branch change a checkpoint belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRef {
    pub id: String,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Snapshot of one artifact's content at one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub id: String,
    #[serde(default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub change_id: Option<String>,
    pub git_commit_sha: String,
    #[serde(default)]
    pub git_branch: Option<String>,
    #[serde(default)]
    pub git_blob_url: Option<String>,
    pub git_raw_url: String,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "artifacts", skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
    #[serde(default, rename = "changes", skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeRef>,
}

impl CheckpointRecord {
    /// File path of the joined artifact, if any.
    #[must_use]
    pub fn file_path(&self) -> Option<&str> {
        self.artifact.as_ref().map(|artifact| artifact.file_path.as_str())
    }

    /// First eight characters of the id, for log lines.
    #[must_use]
    pub fn short_id(&self) -> &str {
        short(&self.id)
    }

    /// First eight characters of the commit SHA.
    #[must_use]
    pub fn short_sha(&self) -> &str {
        short(&self.git_commit_sha)
    }
}

fn short(value: &str) -> &str {
    value
        .char_indices()
        .nth(8)
        .map_or(value, |(idx, _)| &value[..idx])
}

/// Comment anchored to a line range of a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointComment {
    pub id: String,
    pub checkpoint_id: String,
    pub content: String,
    /// Null in the table reads as line 0.
    #[serde(default, deserialize_with = "super::deserialize_or_default")]
    pub line_start: i64,
    #[serde(default, deserialize_with = "super::deserialize_or_default")]
    pub line_end: i64,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_resolved: bool,
}

/// Repository coordinates embedded in an enriched review comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub repo_owner: String,
    pub repo_name: String,
}

/// Spec embedded in an enriched review comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecContext {
    pub spec_key: String,
    pub project_id: String,
    #[serde(default, rename = "projects", skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectRef>,
}

/// Change embedded in an enriched review comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeContext {
    pub id: String,
    #[serde(default)]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub base_branch: Option<String>,
    pub state: String,
    pub spec_id: String,
    #[serde(default, rename = "specs", skip_serializing_if = "Option::is_none")]
    pub spec: Option<SpecContext>,
}

/// Change-level review comment on a file range.
///
/// Columns this crate does not interpret are kept in `extra` and written back
/// out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub id: String,
    pub change_id: String,
    pub file_path: String,
    #[serde(default)]
    pub start_line: Option<i64>,
    #[serde(default)]
    pub end_line: Option<i64>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub is_resolved: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "changes", skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeContext>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A spec folder tracked for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    pub id: String,
    pub spec_key: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// A feature-branch review unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    #[serde(default)]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub base_branch: Option<String>,
    pub state: String,
    pub spec_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Change {
    pub const OPEN: &'static str = "open";

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == Self::OPEN
    }
}

/// Unresolved review comments grouped under their change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeComments {
    pub change: Change,
    pub comments: Vec<ReviewComment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_row_decodes_embedded_relations() {
        let raw = r#"{
            "id":"0123456789abcdef","artifact_id":"a1","change_id":null,
            "git_commit_sha":"deadbeefcafebabe","git_branch":"main",
            "git_raw_url":"https://raw.example/a.md","author_name":"Ada",
            "created_at":"2025-03-01T00:00:00Z",
            "artifacts":{"id":"a1","file_path":"specs/a.md","project_id":"p1"},
            "changes":null
        }"#;
        let record: CheckpointRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.file_path(), Some("specs/a.md"));
        assert_eq!(record.short_id(), "01234567");
        assert_eq!(record.short_sha(), "deadbeef");
        assert!(record.change.is_none());
    }

    #[test]
    fn review_comment_keeps_unknown_columns() {
        let raw = r#"{"id":"r1","change_id":"c1","file_path":"specs/a.md","start_line":3,
            "is_resolved":false,"side":"RIGHT"}"#;
        let comment: ReviewComment = serde_json::from_str(raw).unwrap();
        assert_eq!(comment.extra.get("side"), Some(&Value::String("RIGHT".into())));
        let json = serde_json::to_value(&comment).unwrap();
        assert_eq!(json["side"], "RIGHT");
    }

    #[test]
    fn checkpoint_comment_tolerates_null_lines() {
        let raw = r#"{"id":"c1","checkpoint_id":"cp1","content":"x","line_start":null,
            "created_at":"2025-03-01T00:00:00Z","author_name":null}"#;
        let comment: CheckpointComment = serde_json::from_str(raw).unwrap();
        assert_eq!((comment.line_start, comment.line_end), (0, 0));
        assert!(!comment.is_resolved);
    }

    #[test]
    fn short_handles_short_values() {
        assert_eq!(short("abc"), "abc");
    }
}
