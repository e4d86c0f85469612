mod common;

use common::{checkpoint, checkpoint_comment, init_test_logging, on_change, raw_url, ts};
use ledger_sync::review::{self, CheckpointQuery, QueryOptions, Resolution, StaticContent};
use ledger_sync::storage::MemoryStore;
use ledger_sync::storage::memory::Fault;
use ledger_sync::{CheckpointMiss, LedgerError};

const SHA: &str = "0123456789abcdef";

/// Two files checkpointed in one commit, an older checkpoint of the spec
/// in an earlier commit, and content for all of them.
fn fixture() -> (MemoryStore, StaticContent) {
    init_test_logging();
    let store = MemoryStore::new();
    store.add_checkpoint(checkpoint("cp-old-spec", "fedcba98", Some("specs/spec.md"), 1));
    store.add_checkpoint(on_change(
        checkpoint("cp-spec-0001", SHA, Some("specs/spec.md"), 5),
        "change-1",
    ));
    store.add_checkpoint(checkpoint("cp-plan-0002", SHA, Some("specs/plan.md"), 6));

    store.add_checkpoint_comment(checkpoint_comment("c-30", "cp-spec-0001", 30));
    store.add_checkpoint_comment(checkpoint_comment("c-10", "cp-spec-0001", 10));
    store.add_checkpoint_comment(checkpoint_comment("c-20", "cp-spec-0001", 20));
    store.add_checkpoint_comment(checkpoint_comment("c-plan", "cp-plan-0002", 1));

    let content = StaticContent::new()
        .with(&raw_url("specs/spec.md", "fedcba98"), "old spec\n")
        .with(&raw_url("specs/spec.md", SHA), "# Spec\n")
        .with(&raw_url("specs/plan.md", SHA), "# Plan\n");
    (store, content)
}

fn options(file: Option<&str>, commit: Option<&str>, id: Option<&str>) -> QueryOptions {
    QueryOptions {
        file_path: file.map(str::to_string),
        commit_sha: commit.map(str::to_string),
        checkpoint_id: id.map(str::to_string),
    }
}

fn single(resolution: Resolution) -> review::CheckpointBundle {
    match resolution {
        Resolution::Single(bundle) => bundle,
        Resolution::Multiple(bundles) => panic!("expected one bundle, got {}", bundles.len()),
    }
}

fn query_one(
    store: &MemoryStore,
    content: &StaticContent,
    options: QueryOptions,
) -> review::CheckpointBundle {
    single(review::query(store, content, options).unwrap())
}

#[test]
fn file_path_resolves_latest_checkpoint() {
    let (store, content) = fixture();
    let bundle = query_one(&store, &content, options(Some("specs/spec.md"), None, None));

    assert_eq!(bundle.checkpoint.id, "cp-spec-0001");
    assert_eq!(bundle.content, "# Spec\n");
    assert_eq!(bundle.artifact.file_path.as_deref(), Some("specs/spec.md"));
    assert_eq!(bundle.artifact.project_id.as_deref(), Some("project-1"));
}

#[test]
fn commit_and_file_agrees_with_file_only_for_latest_commit() {
    let (store, content) = fixture();
    let by_file = query_one(&store, &content, options(Some("specs/spec.md"), None, None));
    let by_commit = query_one(&store, &content, options(Some("specs/spec.md"), Some(SHA), None));
    assert_eq!(by_file, by_commit);
}

#[test]
fn commit_and_file_wins_over_checkpoint_id() {
    let (store, content) = fixture();
    let bundle = query_one(
        &store,
        &content,
        options(Some("specs/spec.md"), Some("fedcba98"), Some("cp-plan-0002")),
    );
    assert_eq!(bundle.checkpoint.id, "cp-old-spec");
    assert_eq!(bundle.content, "old spec\n");
}

#[test]
fn checkpoint_id_used_only_without_path_or_commit() {
    let (store, content) = fixture();
    let bundle = query_one(&store, &content, options(None, None, Some("cp-plan-0002")));
    assert_eq!(bundle.checkpoint.id, "cp-plan-0002");
    assert_eq!(bundle.comments.len(), 1);
}

#[test]
fn comments_are_ordered_by_starting_line() {
    let (store, content) = fixture();
    let bundle = query_one(&store, &content, options(None, None, Some("cp-spec-0001")));
    let lines: Vec<i64> = bundle.comments.iter().map(|c| c.line_start).collect();
    assert_eq!(lines, vec![10, 20, 30]);
}

#[test]
fn comments_on_the_same_line_keep_fetch_order() {
    let (store, content) = fixture();
    let mut later = checkpoint_comment("c-20-later", "cp-spec-0001", 20);
    later.created_at = ts(14, 0);
    let mut earlier = checkpoint_comment("c-20-earlier", "cp-spec-0001", 20);
    earlier.created_at = ts(12, 0);
    store.add_checkpoint_comment(later);
    store.add_checkpoint_comment(earlier);

    let bundle = query_one(&store, &content, options(None, None, Some("cp-spec-0001")));
    let ids: Vec<&str> = bundle.comments.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c-10", "c-20", "c-20-later", "c-20-earlier", "c-30"]);
}

#[test]
fn missing_file_in_commit_lists_available_paths() {
    let (store, content) = fixture();
    let err = review::query(&store, &content, options(Some("specs/tasks.md"), Some(SHA), None))
        .unwrap_err();

    let LedgerError::CheckpointNotFound(CheckpointMiss::FileInCommit { available, .. }) = &err
    else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(
        available,
        &vec![
            "specs/spec.md (checkpoint: cp-spec-)".to_string(),
            "specs/plan.md (checkpoint: cp-plan-)".to_string(),
        ]
    );
    let message = err.to_string();
    assert!(message.contains("specs/tasks.md"));
    assert!(message.contains("specs/plan.md"));
}

#[test]
fn unknown_inputs_report_what_was_missing() {
    let (store, content) = fixture();
    let by_file =
        review::query(&store, &content, options(Some("nope.md"), None, None)).unwrap_err();
    assert!(matches!(
        by_file,
        LedgerError::CheckpointNotFound(CheckpointMiss::FilePath { .. })
    ));
    let by_commit =
        review::query(&store, &content, options(None, Some("deadbeef"), None)).unwrap_err();
    assert!(matches!(
        by_commit,
        LedgerError::CheckpointNotFound(CheckpointMiss::Commit { .. })
    ));
    let by_id = review::query(&store, &content, options(None, None, Some("cp-x"))).unwrap_err();
    assert_eq!(by_id.to_string(), "Checkpoint not found: cp-x");
}

#[test]
fn commit_only_returns_every_checkpoint() {
    let (store, content) = fixture();
    let resolution = review::query(&store, &content, options(None, Some(SHA), None)).unwrap();
    let Resolution::Multiple(bundles) = &resolution else {
        panic!("expected a list");
    };
    let ids: Vec<&str> = bundles.iter().map(|b| b.checkpoint.id.as_str()).collect();
    assert_eq!(ids, vec!["cp-spec-0001", "cp-plan-0002"]);

    let json = serde_json::to_value(&resolution).unwrap();
    assert!(json.is_array());
}

#[test]
fn commit_only_skips_checkpoints_that_fail() {
    let (store, content) = fixture();
    store.inject(Fault::CheckpointComments("cp-spec-0001".to_string()));
    let resolution = review::query(&store, &content, options(None, Some(SHA), None)).unwrap();
    assert_eq!(resolution.bundles().len(), 1);
    assert_eq!(resolution.bundles()[0].checkpoint.id, "cp-plan-0002");

    let (store, _) = fixture();
    let partial = StaticContent::new().with(&raw_url("specs/spec.md", SHA), "# Spec\n");
    let resolution = review::query(&store, &partial, options(None, Some(SHA), None)).unwrap();
    assert_eq!(resolution.bundles().len(), 1);
    assert_eq!(resolution.bundles()[0].checkpoint.id, "cp-spec-0001");
}

#[test]
fn single_mode_content_failure_is_fatal() {
    let (store, _) = fixture();
    let err = review::query(
        &store,
        &StaticContent::new(),
        options(Some("specs/spec.md"), None, None),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::ContentFetch { .. }));
}

#[test]
fn resolved_comments_drop_out_of_later_queries() {
    let (store, content) = fixture();
    let ids = ["c-10".to_string(), "c-30".to_string()];
    let report = review::comments::resolve(&store, &ids).unwrap();
    assert!(report.success);
    assert_eq!(report.resolved, 2);
    assert!(store.checkpoint_comment("c-10").unwrap().is_resolved);

    let bundle = query_one(&store, &content, options(Some("specs/spec.md"), None, None));
    let ids: Vec<&str> = bundle.comments.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c-20"]);
}

#[test]
fn invalid_query_never_touches_the_store() {
    let (store, content) = fixture();
    let err = review::query(&store, &content, options(None, Some(" "), Some(""))).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidQuery(_)));
    assert_eq!(store.calls(), 0);
}

#[test]
fn explicit_query_resolves_like_options() {
    let (store, content) = fixture();
    let query = CheckpointQuery::ByCommitAndFile {
        commit_sha: SHA.to_string(),
        file_path: "specs/plan.md".to_string(),
    };
    let bundle = single(review::resolve(&store, &content, &query).unwrap());
    assert_eq!(bundle.checkpoint.id, "cp-plan-0002");
    assert_eq!(bundle.content, "# Plan\n");
}
