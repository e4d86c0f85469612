//! PostgREST store over blocking HTTP.
//!
//! Table layout:
//!
//! | Table | Key |
//! |-------|-----|
//! | `projects` | `(repo_owner, repo_name)` |
//! | `bd_issues` | `(project_id, id)` |
//! | `bd_dependencies` | `(project_id, issue_id, depends_on_id, dependency_type)` |
//! | `bd_comments` | unique on content; `23505` on duplicates |
//! | `checkpoints` | `id`, FKs to `artifacts` and `changes` |
//! | `comments` | `id`, FK `checkpoint_id` |
//! | `review_comments` | `id`, FK `change_id` |
//! | `specs`, `changes` | `id` |

use crate::error::{LedgerError, Result};
use crate::model::{
    Change, CheckpointComment, CheckpointRecord, Comment, CommentId, Dependency, Issue, Project,
    ReviewComment, Spec, Text, UNKNOWN_ACTOR,
};
use crate::storage::query::{Direction, RestQuery};
use crate::storage::{InsertOutcome, RemoteIssueStore, ReviewStore};
use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_RANGE;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};

const REST_PREFIX: &str = "/rest/v1";

const CHECKPOINT_SELECT: &str = "*,
    artifacts!checkpoints_artifact_id_fkey(id,file_path,project_id),
    changes!checkpoints_change_id_fkey(id,branch_name,status)";

// `!inner` turns the embedded filter on `artifacts.file_path` into a row filter.
const CHECKPOINT_BY_FILE_SELECT: &str = "*,
    artifacts!checkpoints_artifact_id_fkey!inner(id,file_path,project_id),
    changes!checkpoints_change_id_fkey(id,branch_name,status)";

const ENRICHED_REVIEW_SELECT: &str = "*,
    changes!inner(
        id,head_branch,base_branch,state,spec_id,
        specs!inner(spec_key,project_id,projects!inner(repo_owner,repo_name))
    )";

/// Blocking PostgREST client implementing both store traits.
#[derive(Clone)]
pub struct RestStore {
    base_url: String,
    api_key: String,
    client: Client,
}

impl fmt::Debug for RestStore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RestStore")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl RestStore {
    /// Build a client for the store at `url` authenticating with `api_key`.
    /// Every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ledger-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: rest_base_url(url),
            api_key: api_key.to_string(),
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, table: &str, query: &RestQuery) -> RequestBuilder {
        let url = format!("{}/{table}", self.base_url);
        trace!(%method, %url, params = ?query.params(), "REST request");
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(query.params())
    }

    fn send(&self, operation: &str, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(remote_error(operation, status, &body))
    }

    fn select<T: DeserializeOwned>(
        &self,
        operation: &str,
        table: &str,
        query: &RestQuery,
    ) -> Result<Vec<T>> {
        let response = self.send(operation, self.request(Method::GET, table, query))?;
        let body = response.text()?;
        let rows: Vec<T> = serde_json::from_str(&body).map_err(|err| {
            LedgerError::remote(
                operation,
                format!("unexpected response body ({err}): {}", truncate_for_error(&body)),
            )
        })?;
        debug!(operation, rows = rows.len(), "REST select");
        Ok(rows)
    }

    fn select_one<T: DeserializeOwned>(
        &self,
        operation: &str,
        table: &str,
        query: RestQuery,
    ) -> Result<Option<T>> {
        let rows = self.select(operation, table, &query.limit(1))?;
        Ok(rows.into_iter().next())
    }

    fn write<B: Serialize + ?Sized>(
        &self,
        operation: &str,
        method: Method,
        table: &str,
        query: &RestQuery,
        prefer: &str,
        body: &B,
    ) -> Result<()> {
        let builder = self
            .request(method, table, query)
            .header("Prefer", prefer)
            .json(body);
        self.send(operation, builder)?;
        Ok(())
    }

    fn count(&self, operation: &str, table: &str, query: &RestQuery) -> Result<usize> {
        let builder = self
            .request(Method::HEAD, table, query)
            .header("Prefer", "count=exact");
        let response = self.send(operation, builder)?;
        let header = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        parse_content_range(header).ok_or_else(|| {
            LedgerError::remote(
                operation,
                format!("missing row count in Content-Range: {header:?}"),
            )
        })
    }
}

/// Normalize a project URL to its REST root (`<url>/rest/v1`).
fn rest_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.ends_with(REST_PREFIX) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{REST_PREFIX}")
    }
}

/// Total from a `Content-Range` header such as `0-24/57` or `*/0`.
fn parse_content_range(header: &str) -> Option<usize> {
    let (_, total) = header.rsplit_once('/')?;
    total.trim().parse().ok()
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

fn remote_error(operation: &str, status: StatusCode, body: &str) -> LedgerError {
    let parsed = serde_json::from_str::<PostgrestError>(body).ok();
    let (code, message) = match parsed {
        Some(err) => {
            let mut message = err.message.unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
            for extra in [err.details, err.hint].into_iter().flatten() {
                if !extra.is_empty() {
                    message.push_str(" - ");
                    message.push_str(&extra);
                }
            }
            (err.code, message)
        }
        None if body.trim().is_empty() => (
            None,
            status.canonical_reason().unwrap_or("request failed").to_string(),
        ),
        None => (None, truncate_for_error(body)),
    };
    LedgerError::Remote {
        operation: operation.to_string(),
        status: Some(status.as_u16()),
        code,
        message,
    }
}

fn truncate_for_error(body: &str) -> String {
    const MAX_LEN: usize = 200;
    if body.chars().count() <= MAX_LEN {
        body.to_owned()
    } else {
        format!("{}...", body.chars().take(MAX_LEN).collect::<String>())
    }
}

// ===== Row shapes =====

#[derive(Debug, Deserialize)]
struct IssueRow {
    id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    issue_type: Option<String>,
    #[serde(default)]
    design: Option<String>,
    #[serde(default)]
    acceptance_criteria: Option<String>,
    #[serde(default)]
    labels: Option<Vec<String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,
}

impl From<IssueRow> for Issue {
    fn from(row: IssueRow) -> Self {
        let mut issue = Self::new(row.id, row.title, row.created_at);
        issue.updated_at = row.updated_at;
        if let Some(status) = row.status {
            issue.status = status.parse().unwrap_or_default();
        }
        if let Some(priority) = row.priority {
            issue.priority = crate::model::Priority(priority);
        }
        if let Some(issue_type) = row.issue_type {
            issue.issue_type = issue_type.parse().unwrap_or_default();
        }
        issue.description = row.description.and_then(Text::new);
        issue.design = row.design.and_then(Text::new);
        issue.acceptance_criteria = row.acceptance_criteria.and_then(Text::new);
        issue.closed_at = row.closed_at;
        issue.labels = row
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter(|label| !label.is_empty())
            .collect();
        issue
    }
}

#[derive(Debug, Deserialize)]
struct DependencyRow {
    issue_id: String,
    depends_on_id: String,
    #[serde(default)]
    dependency_type: Option<String>,
    #[serde(default, rename = "type")]
    legacy_type: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    created_by: Option<String>,
}

impl From<DependencyRow> for Dependency {
    fn from(row: DependencyRow) -> Self {
        let dep_type = row
            .dependency_type
            .or(row.legacy_type)
            .unwrap_or_else(|| "blocks".to_string());
        Self {
            issue_id: row.issue_id,
            depends_on_id: row.depends_on_id,
            dep_type: dep_type.parse().unwrap_or_default(),
            created_at: row.created_at,
            created_by: row
                .created_by
                .filter(|actor| !actor.is_empty())
                .unwrap_or_else(|| UNKNOWN_ACTOR.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommentRow {
    id: CommentId,
    issue_id: String,
    #[serde(default)]
    author: Option<String>,
    text: String,
    created_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Self {
            id: Some(row.id),
            issue_id: row.issue_id,
            author: row
                .author
                .filter(|author| !author.is_empty())
                .unwrap_or_else(|| UNKNOWN_ACTOR.to_string()),
            text: row.text,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct IssuePayload<'a> {
    project_id: &'a str,
    id: &'a str,
    title: &'a str,
    description: Option<&'a str>,
    status: &'a str,
    priority: i32,
    issue_type: &'a str,
    design: Option<&'a str>,
    acceptance_criteria: Option<&'a str>,
    labels: Vec<&'a str>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl<'a> IssuePayload<'a> {
    fn new(project_id: &'a str, issue: &'a Issue) -> Self {
        Self {
            project_id,
            id: &issue.id,
            title: &issue.title,
            description: issue.description.as_deref(),
            status: issue.status.as_str(),
            priority: issue.priority.0,
            issue_type: issue.issue_type.as_str(),
            design: issue.design.as_deref(),
            acceptance_criteria: issue.acceptance_criteria.as_deref(),
            labels: issue.labels.iter().map(String::as_str).collect(),
            created_at: issue.created_at,
            updated_at: issue.updated_at,
            closed_at: issue.closed_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct DependencyPayload<'a> {
    project_id: &'a str,
    issue_id: &'a str,
    depends_on_id: &'a str,
    dependency_type: &'a str,
    created_at: DateTime<Utc>,
    created_by: &'a str,
}

#[derive(Debug, Serialize)]
struct CommentPayload<'a> {
    project_id: &'a str,
    issue_id: &'a str,
    author: &'a str,
    text: &'a str,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ResolvePayload {
    is_resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=minimal";
const MINIMAL_PREFER: &str = "return=minimal";

impl RemoteIssueStore for RestStore {
    fn find_project(&self, owner: &str, name: &str) -> Result<Option<Project>> {
        let query = RestQuery::new()
            .select("id,repo_owner,repo_name")
            .eq("repo_owner", owner)
            .eq("repo_name", name);
        self.select_one("find project", "projects", query)
    }

    fn list_issues(&self, project_id: &str) -> Result<Vec<Issue>> {
        let query = RestQuery::new()
            .select("*")
            .eq("project_id", project_id)
            .order("created_at", Direction::Asc)
            .order("id", Direction::Asc);
        let rows: Vec<IssueRow> = self.select("list bd_issues", "bd_issues", &query)?;
        Ok(rows.into_iter().map(Issue::from).collect())
    }

    fn list_dependencies(&self, project_id: &str) -> Result<Vec<Dependency>> {
        let query = RestQuery::new().select("*").eq("project_id", project_id);
        let rows: Vec<DependencyRow> =
            self.select("list bd_dependencies", "bd_dependencies", &query)?;
        Ok(rows.into_iter().map(Dependency::from).collect())
    }

    fn list_comments(&self, project_id: &str) -> Result<Vec<Comment>> {
        let query = RestQuery::new()
            .select("*")
            .eq("project_id", project_id)
            .order("created_at", Direction::Asc);
        let rows: Vec<CommentRow> = self.select("list bd_comments", "bd_comments", &query)?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    fn count_issues(&self, project_id: &str) -> Result<usize> {
        let query = RestQuery::new().select("id").eq("project_id", project_id);
        self.count("count bd_issues", "bd_issues", &query)
    }

    fn upsert_issue(&self, project_id: &str, issue: &Issue) -> Result<()> {
        let query = RestQuery::new().on_conflict(&["project_id", "id"]);
        self.write(
            "upsert bd_issues",
            Method::POST,
            "bd_issues",
            &query,
            UPSERT_PREFER,
            &IssuePayload::new(project_id, issue),
        )
    }

    fn upsert_dependency(&self, project_id: &str, dependency: &Dependency) -> Result<()> {
        let query = RestQuery::new().on_conflict(&[
            "project_id",
            "issue_id",
            "depends_on_id",
            "dependency_type",
        ]);
        let payload = DependencyPayload {
            project_id,
            issue_id: &dependency.issue_id,
            depends_on_id: &dependency.depends_on_id,
            dependency_type: dependency.dep_type.as_str(),
            created_at: dependency.created_at,
            created_by: &dependency.created_by,
        };
        self.write(
            "upsert bd_dependencies",
            Method::POST,
            "bd_dependencies",
            &query,
            UPSERT_PREFER,
            &payload,
        )
    }

    fn insert_comment(&self, project_id: &str, comment: &Comment) -> Result<InsertOutcome> {
        let payload = CommentPayload {
            project_id,
            issue_id: &comment.issue_id,
            author: &comment.author,
            text: &comment.text,
            created_at: comment.created_at,
        };
        match self.write(
            "insert bd_comments",
            Method::POST,
            "bd_comments",
            &RestQuery::new(),
            MINIMAL_PREFER,
            &payload,
        ) {
            Ok(()) => Ok(InsertOutcome::Inserted),
            Err(err) if err.is_unique_violation() => Ok(InsertOutcome::Duplicate),
            Err(err) => Err(err),
        }
    }
}

impl ReviewStore for RestStore {
    fn latest_checkpoint_for_file(&self, file_path: &str) -> Result<Option<CheckpointRecord>> {
        let query = RestQuery::new()
            .select(CHECKPOINT_BY_FILE_SELECT)
            .eq("artifacts.file_path", file_path)
            .order("created_at", Direction::Desc);
        self.select_one("latest checkpoint for file", "checkpoints", query)
    }

    fn checkpoints_for_commit(&self, commit_sha: &str) -> Result<Vec<CheckpointRecord>> {
        let query = RestQuery::new()
            .select(CHECKPOINT_SELECT)
            .eq("git_commit_sha", commit_sha)
            .order("created_at", Direction::Asc);
        self.select("checkpoints for commit", "checkpoints", &query)
    }

    fn checkpoint_by_id(&self, checkpoint_id: &str) -> Result<Option<CheckpointRecord>> {
        let query = RestQuery::new()
            .select(CHECKPOINT_SELECT)
            .eq("id", checkpoint_id);
        self.select_one("checkpoint by id", "checkpoints", query)
    }

    fn unresolved_checkpoint_comments(
        &self,
        checkpoint_id: &str,
    ) -> Result<Vec<CheckpointComment>> {
        let query = RestQuery::new()
            .select("*")
            .eq("checkpoint_id", checkpoint_id)
            .eq("is_resolved", false)
            .order("line_start", Direction::Asc)
            .order("created_at", Direction::Asc);
        self.select("list checkpoint comments", "comments", &query)
    }

    fn resolve_checkpoint_comments(&self, ids: &[String]) -> Result<usize> {
        let query = RestQuery::new().in_list("id", ids);
        let payload = ResolvePayload {
            is_resolved: true,
            updated_at: Some(Utc::now()),
        };
        self.write(
            "resolve comments",
            Method::PATCH,
            "comments",
            &query,
            MINIMAL_PREFER,
            &payload,
        )?;
        Ok(ids.len())
    }

    fn review_comments_by_prefix(
        &self,
        prefix: &str,
        enriched: bool,
    ) -> Result<Vec<ReviewComment>> {
        let select = if enriched { ENRICHED_REVIEW_SELECT } else { "*" };
        let query = RestQuery::new()
            .select(select)
            .starts_with("file_path", prefix)
            .eq("is_resolved", false)
            .order("file_path", Direction::Asc)
            .order("start_line", Direction::Asc);
        self.select("review comments by path", "review_comments", &query)
    }

    fn unresolved_review_comments_for_change(
        &self,
        change_id: &str,
    ) -> Result<Vec<ReviewComment>> {
        let query = RestQuery::new()
            .select("*")
            .eq("change_id", change_id)
            .eq("is_resolved", false)
            .order("file_path", Direction::Asc)
            .order("start_line", Direction::Asc);
        self.select("review comments by change", "review_comments", &query)
    }

    fn specs_for_project(&self, project_id: &str) -> Result<Vec<Spec>> {
        let query = RestQuery::new()
            .select("id,spec_key,project_id")
            .eq("project_id", project_id);
        self.select("list specs", "specs", &query)
    }

    fn open_changes_for_specs(&self, spec_ids: &[String]) -> Result<Vec<Change>> {
        if spec_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = RestQuery::new()
            .select("*")
            .in_list("spec_id", spec_ids)
            .eq("state", Change::OPEN)
            .order("created_at", Direction::Asc);
        self.select("list open changes", "changes", &query)
    }

    fn resolve_review_comments(&self, ids: &[String]) -> Result<usize> {
        let query = RestQuery::new().in_list("id", ids);
        let payload = ResolvePayload {
            is_resolved: true,
            updated_at: None,
        };
        self.write(
            "resolve review comments",
            Method::PATCH,
            "review_comments",
            &query,
            MINIMAL_PREFER,
            &payload,
        )?;
        Ok(ids.len())
    }
}
