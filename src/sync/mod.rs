//! Ledger file handling and remote synchronization for `ledger_sync`.
//!
//! This module handles:
//! - Decode: JSONL ledger text -> issues (strict and lenient)
//! - Encode: issues -> canonical JSONL text
//! - Backups and atomic writes of the ledger file
//! - Pull (remote -> ledger) and push (ledger -> remote), in submodules

pub mod pull;
pub mod push;

pub use pull::{PullReport, pull};
pub use push::{IssueFailure, IssueOutcome, PushReport, push};

use crate::error::{LedgerError, Result};
use crate::model::Issue;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Which project a sync talks to and which ledger file it uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub repo_owner: String,
    pub repo_name: String,
    pub ledger_path: PathBuf,
}

const CONFLICT_START: &str = "<<<<<<<";
const CONFLICT_SEPARATOR: &str = "=======";
const CONFLICT_END: &str = ">>>>>>>";

fn is_conflict_marker(line: &str) -> bool {
    line.starts_with(CONFLICT_START)
        || line.starts_with(CONFLICT_SEPARATOR)
        || line.starts_with(CONFLICT_END)
}

fn decode_line(line_num: usize, line: &str) -> Result<Option<Issue>> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    if is_conflict_marker(line) {
        return Err(LedgerError::MalformedRecord {
            line: line_num,
            reason: "merge conflict marker; resolve the conflict first".to_string(),
        });
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| LedgerError::MalformedRecord {
            line: line_num,
            reason: e.to_string(),
        })
}

/// Decode ledger text into issues, in file order.
///
/// Blank lines are skipped.
///
/// # Errors
///
/// Returns [`LedgerError::MalformedRecord`] for the first non-blank line that
/// is not a valid issue record.
pub fn decode_ledger(text: &str) -> Result<Vec<Issue>> {
    let mut issues = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if let Some(issue) = decode_line(idx + 1, line)? {
            issues.push(issue);
        }
    }
    Ok(issues)
}

/// Result of [`decode_ledger_lenient`].
#[derive(Debug, Default)]
pub struct LenientDecode {
    pub issues: Vec<Issue>,
    /// One [`LedgerError::MalformedRecord`] per skipped line.
    pub skipped: Vec<LedgerError>,
}

/// Decode ledger text, skipping malformed lines instead of failing.
#[must_use]
pub fn decode_ledger_lenient(text: &str) -> LenientDecode {
    let mut decoded = LenientDecode::default();
    for (idx, line) in text.lines().enumerate() {
        match decode_line(idx + 1, line) {
            Ok(Some(issue)) => decoded.issues.push(issue),
            Ok(None) => {}
            Err(err) => {
                debug!(%err, "Skipping ledger line");
                decoded.skipped.push(err);
            }
        }
    }
    decoded
}

/// Encode issues as ledger text: one JSON object per line, newline
/// terminated. No issues encodes to a single newline.
///
/// # Errors
///
/// Returns an error if an issue cannot be serialized.
pub fn encode_ledger(issues: &[Issue]) -> Result<String> {
    let mut lines = Vec::with_capacity(issues.len());
    for issue in issues {
        lines.push(serde_json::to_string(issue)?);
    }
    let mut text = lines.join("\n");
    text.push('\n');
    Ok(text)
}

/// SHA-256 of encoded ledger text, lowercase hex.
#[must_use]
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Read and decode the ledger at `path`.
///
/// # Errors
///
/// Returns [`LedgerError::LedgerNotFound`] if the file does not exist, and
/// [`LedgerError::MalformedRecord`] for invalid lines.
pub fn read_ledger(path: &Path) -> Result<Vec<Issue>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(LedgerError::LedgerNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(LedgerError::Io(e)),
    };
    decode_ledger(&text)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Copy an existing ledger to `<path>.backup-<unix-millis>`.
///
/// Returns `None` when there is no ledger yet. Existing backups are never
/// overwritten.
///
/// # Errors
///
/// Returns an error if the copy fails.
pub fn backup_ledger(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut millis = Utc::now().timestamp_millis();
    let mut backup = with_suffix(path, &format!(".backup-{millis}"));
    while backup.exists() {
        millis += 1;
        backup = with_suffix(path, &format!(".backup-{millis}"));
    }
    fs::copy(path, &backup)?;
    info!(backup = %backup.display(), "Backed up existing ledger");
    Ok(Some(backup))
}

/// Replace the file at `path` with `text` atomically (temp file, fsync,
/// rename). The parent directory is created if needed.
///
/// # Errors
///
/// Returns an error if the path has no parent or any file operation fails.
pub fn write_ledger_atomic(path: &Path, text: &str) -> Result<()> {
    let parent_dir = path
        .parent()
        .ok_or_else(|| LedgerError::Config(format!("Invalid ledger path: {}", path.display())))?;
    if !parent_dir.as_os_str().is_empty() {
        fs::create_dir_all(parent_dir)?;
    }

    let temp_path = with_suffix(path, ".tmp");
    let temp_file = File::create(&temp_path)?;
    let mut writer = BufWriter::new(temp_file);
    writer.write_all(text.as_bytes())?;
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| LedgerError::Io(e.into_error()))?
        .sync_all()?;

    fs::rename(&temp_path, path)?;
    debug!(path = %path.display(), bytes = text.len(), "Wrote ledger");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Comment, Dependency, DependencyType, Text};
    use chrono::{DateTime, TimeZone};
    use tempfile::TempDir;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap()
    }

    fn make_test_issue(id: &str, title: &str) -> Issue {
        Issue::new(id, title, ts(1))
    }

    #[test]
    fn encode_uses_fixed_field_order() {
        let mut issue = make_test_issue("bd-1", "First");
        issue.description = Text::new("Body");
        issue.labels.insert("backend".to_string());
        issue.dependencies.push(Dependency {
            issue_id: "bd-1".to_string(),
            depends_on_id: "bd-0".to_string(),
            dep_type: DependencyType::Blocks,
            created_at: ts(1),
            created_by: "ada".to_string(),
        });
        let text = encode_ledger(&[issue]).unwrap();
        assert_eq!(
            text,
            "{\"id\":\"bd-1\",\"title\":\"First\",\"status\":\"open\",\"priority\":2,\
             \"issue_type\":\"task\",\"created_at\":\"2025-01-01T12:00:00Z\",\
             \"updated_at\":\"2025-01-01T12:00:00Z\",\"description\":\"Body\",\
             \"labels\":[\"backend\"],\"dependencies\":[{\"issue_id\":\"bd-1\",\
             \"depends_on_id\":\"bd-0\",\"type\":\"blocks\",\
             \"created_at\":\"2025-01-01T12:00:00Z\",\"created_by\":\"ada\"}]}\n"
        );
    }

    #[test]
    fn encode_empty_is_single_newline() {
        assert_eq!(encode_ledger(&[]).unwrap(), "\n");
        assert!(decode_ledger("\n").unwrap().is_empty());
    }

    #[test]
    fn decode_skips_blank_lines_and_keeps_order() {
        let text = encode_ledger(&[make_test_issue("b", "B"), make_test_issue("a", "A")]).unwrap();
        let padded = format!("\n{text}\n   \n");
        let issues = decode_ledger(&padded).unwrap();
        let ids: Vec<_> = issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn decode_reports_one_based_line() {
        let good = encode_ledger(&[make_test_issue("a", "A")]).unwrap();
        let text = format!("{good}{{not json}}\n");
        match decode_ledger(&text).unwrap_err() {
            LedgerError::MalformedRecord { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn decode_requires_status_priority_and_type() {
        let good = encode_ledger(&[make_test_issue("a", "A")]).unwrap();
        let bare = concat!(
            r#"{"id":"bd-1","title":"t","created_at":"2024-01-01T00:00:00Z","#,
            r#""updated_at":"2024-01-01T00:00:00Z"}"#
        );
        let text = format!("{good}{bare}\n");
        match decode_ledger(&text).unwrap_err() {
            LedgerError::MalformedRecord { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
        let message = decode_ledger(bare).unwrap_err().to_string();
        assert!(message.starts_with("Malformed record at line 1:"));
        assert!(message.contains("missing field `status`"));
    }

    #[test]
    fn decode_rejects_conflict_markers() {
        let text = "<<<<<<< HEAD\n";
        let err = decode_ledger(text).unwrap_err();
        assert!(err.to_string().contains("merge conflict"));
    }

    #[test]
    fn lenient_decode_collects_skipped_lines() {
        let mut issue = make_test_issue("a", "A");
        issue.comments.push(Comment {
            id: None,
            issue_id: "a".to_string(),
            author: "ada".to_string(),
            text: "hi".to_string(),
            created_at: ts(2),
        });
        let good = encode_ledger(&[issue]).unwrap();
        let text = format!("garbage\n{good}{{\"id\":1}}\n");
        let decoded = decode_ledger_lenient(&text);
        assert_eq!(decoded.issues.len(), 1);
        assert_eq!(decoded.issues[0].comments.len(), 1);
        assert_eq!(decoded.skipped.len(), 2);
    }

    #[test]
    fn read_missing_ledger_is_not_found() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("issues.jsonl");
        assert!(matches!(
            read_ledger(&path),
            Err(LedgerError::LedgerNotFound { .. })
        ));
    }

    #[test]
    fn atomic_write_creates_parent_and_leaves_no_temp() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".beads").join("issues.jsonl");
        write_ledger_atomic(&path, "x\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "x\n");
        assert!(!with_suffix(&path, ".tmp").exists());
    }

    #[test]
    fn backup_copies_without_removing_original() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("issues.jsonl");
        assert!(backup_ledger(&path).unwrap().is_none());

        fs::write(&path, "old\n").unwrap();
        let first = backup_ledger(&path).unwrap().unwrap();
        let second = backup_ledger(&path).unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(&first).unwrap(), "old\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\n");
        assert!(
            first
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("issues.jsonl.backup-")
        );
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
