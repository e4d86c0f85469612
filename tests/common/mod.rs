#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use ledger_sync::model::{
    ArtifactRef, Change, ChangeRef, CheckpointComment, CheckpointRecord, Comment, Dependency,
    DependencyType, Issue, Project, ReviewComment, Spec,
};
use ledger_sync::storage::MemoryStore;
use ledger_sync::sync::SyncTarget;
use std::path::Path;
use std::process::Command;
use std::sync::Once;

static INIT: Once = Once::new();

pub const OWNER: &str = "acme";
pub const REPO: &str = "widgets";

pub fn init_test_logging() {
    INIT.call_once(|| {
        ledger_sync::logging::init_test_logging();
    });
}

pub fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
}

pub fn issue(id: &str, day: u32) -> Issue {
    Issue::new(id, format!("Issue {id}"), ts(day, 9))
}

pub fn dep(issue_id: &str, depends_on_id: &str) -> Dependency {
    Dependency {
        issue_id: issue_id.to_string(),
        depends_on_id: depends_on_id.to_string(),
        dep_type: DependencyType::Blocks,
        created_at: ts(10, 0),
        created_by: "ada".to_string(),
    }
}

pub fn comment(issue_id: &str, text: &str, hour: u32) -> Comment {
    Comment {
        id: None,
        issue_id: issue_id.to_string(),
        author: "ada".to_string(),
        text: text.to_string(),
        created_at: ts(11, hour),
    }
}

/// Store with the standard project registered.
pub fn store_with_project() -> (MemoryStore, Project) {
    init_test_logging();
    let store = MemoryStore::new();
    let project = store.add_project(OWNER, REPO);
    (store, project)
}

pub fn target(ledger_path: &Path) -> SyncTarget {
    SyncTarget {
        repo_owner: OWNER.to_string(),
        repo_name: REPO.to_string(),
        ledger_path: ledger_path.to_path_buf(),
    }
}

pub fn raw_url(path: &str, sha: &str) -> String {
    format!("https://raw.example.com/acme/widgets/{sha}/{path}")
}

pub fn checkpoint(id: &str, sha: &str, path: Option<&str>, hour: u32) -> CheckpointRecord {
    CheckpointRecord {
        id: id.to_string(),
        artifact_id: path.map(|_| format!("artifact-{id}")),
        change_id: None,
        git_commit_sha: sha.to_string(),
        git_branch: Some("main".to_string()),
        git_blob_url: None,
        git_raw_url: raw_url(path.unwrap_or("unknown"), sha),
        author_name: Some("Ada".to_string()),
        author_email: Some("ada@example.com".to_string()),
        message: Some("Update spec".to_string()),
        created_at: ts(12, hour),
        artifact: path.map(|file_path| ArtifactRef {
            id: Some(format!("artifact-{id}")),
            file_path: file_path.to_string(),
            project_id: Some("project-1".to_string()),
        }),
        change: None,
    }
}

pub fn on_change(mut checkpoint: CheckpointRecord, change_id: &str) -> CheckpointRecord {
    checkpoint.change_id = Some(change_id.to_string());
    checkpoint.change = Some(ChangeRef {
        id: change_id.to_string(),
        branch_name: Some("feature/x".to_string()),
        status: Some("open".to_string()),
    });
    checkpoint
}

pub fn checkpoint_comment(id: &str, checkpoint_id: &str, line_start: i64) -> CheckpointComment {
    CheckpointComment {
        id: id.to_string(),
        checkpoint_id: checkpoint_id.to_string(),
        content: format!("comment {id}"),
        line_start,
        line_end: line_start + 1,
        author_name: Some("Grace".to_string()),
        author_id: Some("user-1".to_string()),
        created_at: ts(13, 0),
        is_resolved: false,
    }
}

pub fn spec(id: &str, key: &str, project_id: &str) -> Spec {
    Spec {
        id: id.to_string(),
        spec_key: key.to_string(),
        project_id: Some(project_id.to_string()),
    }
}

pub fn change(id: &str, spec_id: &str, state: &str) -> Change {
    Change {
        id: id.to_string(),
        head_branch: Some(format!("feature/{id}")),
        base_branch: Some("main".to_string()),
        state: state.to_string(),
        spec_id: spec_id.to_string(),
        extra: serde_json::Map::new(),
    }
}

pub fn review_comment(id: &str, change_id: &str, file_path: &str, line: i64) -> ReviewComment {
    ReviewComment {
        id: id.to_string(),
        change_id: change_id.to_string(),
        file_path: file_path.to_string(),
        start_line: Some(line),
        end_line: Some(line),
        body: Some(format!("review {id}")),
        author: Some("grace".to_string()),
        is_resolved: false,
        created_at: Some(ts(14, 0)),
        change: None,
        extra: serde_json::Map::new(),
    }
}

/// The binary, isolated from the caller's environment and config files.
pub fn ledger_sync_cmd(workdir: &Path) -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("ledger-sync");
    let mut cmd = Command::new(bin.as_os_str());
    cmd.current_dir(workdir).env("HOME", workdir);
    for var in [
        "SUPABASE_URL",
        "SUPABASE_KEY",
        "SUPABASE_SERVICE_ROLE_KEY",
        "GITHUB_REPO_OWNER",
        "GITHUB_REPO_NAME",
        "BEADS_JSONL",
        "LEDGER_SYNC_TIMEOUT_SECS",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}
