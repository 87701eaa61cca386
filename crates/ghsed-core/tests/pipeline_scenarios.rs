//! End-to-end pipeline runs against the in-memory forge.

use std::sync::Arc;

use ghsed_core::{
    parse_instructions, parse_target, GhsedError, Pipeline, RunConfig, RunMode,
    ScriptedOperator, SkipReason,
};
use ghsed_forge::fakes::{ForgeCall, MemoryForge};

const BRANCH: &str = "ghsed-20240101000000";

fn two_repos() -> Arc<MemoryForge> {
    let forge = MemoryForge::new();
    forge.seed_repo("acme/api", "main", &[("src/lib.rs", "let foo = 1;\n")]);
    forge.seed_repo("acme/web", "master", &[("index.js", "foo();\n")]);
    Arc::new(forge)
}

fn pipeline(forge: &Arc<MemoryForge>, config: RunConfig) -> Pipeline {
    Pipeline::new(forge.clone(), config)
}

fn pull_request_config() -> RunConfig {
    RunConfig::new("ghsed s/foo/bar/ acme/*").with_branch(BRANCH)
}

/// proceed, accept the suggested branch, confirm one file
fn accept_one_file(op: ScriptedOperator) -> ScriptedOperator {
    op.then_confirm(true).then_input("").then_confirm(true)
}

// ---------------------------------------------------------------------------
// Pull request mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_two_confirmed_repos_get_commit_and_pull_request_each() {
    let forge = two_repos();
    let target = parse_target("acme/*").unwrap();
    let instructions = parse_instructions("s/foo/bar/").unwrap();
    let mut operator = accept_one_file(accept_one_file(ScriptedOperator::new()));

    let report = pipeline(&forge, pull_request_config())
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits.len(), 2);
    assert_eq!(report.pull_requests.len(), 2);
    assert!(report.skipped.is_empty());
    assert_eq!(operator.remaining(), 0);

    let api = &forge.pull_requests("acme/api")[0];
    assert_eq!(api.head, format!("acme:{BRANCH}"));
    assert_eq!(api.base, "main");
    let web = &forge.pull_requests("acme/web")[0];
    assert_eq!(web.head, format!("acme:{BRANCH}"));
    assert_eq!(web.base, "master");

    assert_eq!(
        forge.file_on_branch("acme/api", BRANCH, "src/lib.rs").as_deref(),
        Some("let bar = 1;\n")
    );
    assert_eq!(
        forge.file_on_branch("acme/web", BRANCH, "index.js").as_deref(),
        Some("bar();\n")
    );
    // default branches are untouched
    assert_eq!(
        forge.file_on_branch("acme/web", "master", "index.js").as_deref(),
        Some("foo();\n")
    );
}

#[tokio::test]
async fn test_declined_repository_is_skipped() {
    let forge = two_repos();
    let target = parse_target("acme").unwrap();
    let instructions = parse_instructions("s/foo/bar/").unwrap();
    let mut operator = accept_one_file(ScriptedOperator::new()).then_confirm(false);

    let report = pipeline(&forge, pull_request_config())
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits.len(), 1);
    assert_eq!(report.commits[0].repository, "acme/api");
    assert_eq!(report.pull_requests.len(), 1);
    assert_eq!(report.skipped_for(SkipReason::Declined), vec!["acme/web"]);
    assert!(!forge.has_branch("acme/web", BRANCH));
    assert!(forge.write_calls().iter().all(|c| c.repo() == "acme/api"));
}

#[tokio::test]
async fn test_default_branch_is_refused_without_in_place() {
    let forge = Arc::new(MemoryForge::new());
    forge.seed_repo("acme/api", "master", &[("a.txt", "foo\n")]);
    let target = parse_target("acme/api").unwrap();
    let instructions = parse_instructions("s/foo/bar/").unwrap();
    let config = RunConfig::new("ghsed").with_branch("master");
    let mut operator = accept_one_file(ScriptedOperator::new());

    let report = pipeline(&forge, config)
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap();

    assert!(report.commits.is_empty());
    assert!(report.pull_requests.is_empty());
    assert_eq!(
        report.skipped_for(SkipReason::DefaultBranchProtected),
        vec!["acme/api"]
    );
    assert!(forge.write_calls().is_empty());
}

#[tokio::test]
async fn test_unconfirmed_file_keeps_its_content() {
    let forge = Arc::new(MemoryForge::new());
    forge.seed_repo(
        "acme/api",
        "main",
        &[("a.txt", "foo a\n"), ("b.txt", "foo b\n")],
    );
    let target = parse_target("acme/api").unwrap();
    let instructions = parse_instructions("s/foo/bar/").unwrap();
    let mut operator = ScriptedOperator::new()
        .then_confirm(true)
        .then_input("")
        .then_confirm(true)
        .then_confirm(false);

    let report = pipeline(&forge, pull_request_config())
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits[0].files, vec!["a.txt"]);
    assert_eq!(
        forge.file_on_branch("acme/api", BRANCH, "a.txt").as_deref(),
        Some("bar a\n")
    );
    assert_eq!(
        forge.file_on_branch("acme/api", BRANCH, "b.txt").as_deref(),
        Some("foo b\n")
    );
}

#[tokio::test]
async fn test_zero_confirmed_files_write_nothing() {
    let forge = two_repos();
    let target = parse_target("acme/api").unwrap();
    let instructions = parse_instructions("s/foo/bar/").unwrap();
    let mut operator = ScriptedOperator::new()
        .then_confirm(true)
        .then_input("")
        .then_confirm(false);

    let report = pipeline(&forge, pull_request_config())
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap();

    assert!(report.commits.is_empty());
    assert_eq!(
        report.skipped_for(SkipReason::NoConfirmedFiles),
        vec!["acme/api"]
    );
    assert!(forge.write_calls().is_empty());
}

#[tokio::test]
async fn test_branch_answer_is_suggested_for_the_next_repository() {
    let forge = two_repos();
    let target = parse_target("acme").unwrap();
    let instructions = parse_instructions("s/foo/bar/").unwrap();
    let mut operator = ScriptedOperator::new()
        .then_confirm(true)
        .then_input("feature/rename")
        .then_confirm(true)
        .then_confirm(true)
        .then_input("")
        .then_confirm(true);

    let report = pipeline(&forge, pull_request_config())
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap();

    let branches: Vec<&str> = report.commits.iter().map(|c| c.branch.as_str()).collect();
    assert_eq!(branches, vec!["feature/rename", "feature/rename"]);
    assert!(forge.has_branch("acme/web", "feature/rename"));
    assert!(!forge.has_branch("acme/web", BRANCH));
}

#[tokio::test]
async fn test_repository_without_changes_is_not_reviewed() {
    let forge = Arc::new(MemoryForge::new());
    forge.seed_repo("acme/api", "main", &[("a.txt", "Foo\n")]);
    let target = parse_target("acme").unwrap();
    let instructions = parse_instructions("s/Foo/Foo/").unwrap();
    let mut operator = ScriptedOperator::new().then_confirm(true);

    let report = pipeline(&forge, pull_request_config())
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.skipped_for(SkipReason::NoChanges), vec!["acme/api"]);
    assert!(operator.prompts().is_empty());
    assert_eq!(operator.remaining(), 1);
}

// ---------------------------------------------------------------------------
// In-place mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_in_place_commits_to_default_branch_without_pull_request() {
    let forge = two_repos();
    let target = parse_target("acme").unwrap();
    let instructions = parse_instructions("s/foo/bar/").unwrap();
    let config = pull_request_config().with_mode(RunMode::InPlace { branch: None });
    let mut operator = accept_one_file(accept_one_file(ScriptedOperator::new()));

    let report = pipeline(&forge, config)
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap();

    let branches: Vec<&str> = report.commits.iter().map(|c| c.branch.as_str()).collect();
    assert_eq!(branches, vec!["main", "master"]);
    assert!(report.pull_requests.is_empty());
    assert_eq!(
        forge.file_on_branch("acme/web", "master", "index.js").as_deref(),
        Some("bar();\n")
    );
    assert!(!forge
        .write_calls()
        .iter()
        .any(|c| matches!(c, ForgeCall::CreatePullRequest { .. } | ForgeCall::CreateBranch { .. })));
}

#[tokio::test]
async fn test_in_place_with_branch_creates_it_once() {
    let forge = two_repos();
    let target = parse_target("acme/api").unwrap();
    let instructions = parse_instructions("s/foo/bar/").unwrap();
    let config = pull_request_config().with_mode(RunMode::InPlace {
        branch: Some("hotfix".to_string()),
    });
    let mut operator = accept_one_file(ScriptedOperator::new());

    let report = pipeline(&forge, config)
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits[0].branch, "hotfix");
    assert!(report.pull_requests.is_empty());
    assert_eq!(
        forge.file_on_branch("acme/api", "hotfix", "src/lib.rs").as_deref(),
        Some("let bar = 1;\n")
    );
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_commit_failure_aborts_the_run() {
    let forge = two_repos();
    forge.fail_commits("acme/api");
    let target = parse_target("acme").unwrap();
    let instructions = parse_instructions("s/foo/bar/").unwrap();
    let mut operator = accept_one_file(accept_one_file(ScriptedOperator::new()));

    let err = pipeline(&forge, pull_request_config())
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap_err();

    assert!(matches!(err, GhsedError::Commit { ref repo, .. } if repo == "acme/api"));
    // acme/web was never reviewed
    assert_eq!(operator.remaining(), 3);
    assert!(!forge.has_branch("acme/web", BRANCH));
}

#[tokio::test]
async fn test_failed_search_query_does_not_stop_the_others() {
    let forge = two_repos();
    forge.fail_search("repo:acme/api user:acme baz");
    let target = parse_target("acme/api").unwrap();
    let instructions = parse_instructions("s/foo/bar/\ns/baz/qux/").unwrap();
    let mut operator = accept_one_file(ScriptedOperator::new());

    let report = pipeline(&forge, pull_request_config())
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits.len(), 1);
    assert_eq!(report.commits[0].repository, "acme/api");
}

#[tokio::test]
async fn test_empty_search_ends_quietly() {
    let forge = two_repos();
    let target = parse_target("acme").unwrap();
    let instructions = parse_instructions("s/nothing/x/").unwrap();
    let mut operator = ScriptedOperator::new();

    let report = pipeline(&forge, pull_request_config())
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap();

    assert!(report.commits.is_empty());
    assert!(report.skipped.is_empty());
    assert!(operator.prompts().is_empty());
}

// ---------------------------------------------------------------------------
// Targeting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_file_glob_limits_the_reviewed_files() {
    let forge = Arc::new(MemoryForge::new());
    forge.seed_repo(
        "acme/docs",
        "main",
        &[("guide/intro.md", "foo\n"), ("build.rs", "// foo\n")],
    );
    let target = parse_target("acme/*/*.md").unwrap();
    let instructions = parse_instructions("s/foo/bar/").unwrap();
    let mut operator = accept_one_file(ScriptedOperator::new());

    let report = pipeline(&forge, pull_request_config())
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits[0].files, vec!["guide/intro.md"]);
    assert!(!operator
        .prompts()
        .iter()
        .any(|p| p.contains("build.rs")));
    assert_eq!(
        forge.file_on_branch("acme/docs", BRANCH, "build.rs").as_deref(),
        Some("// foo\n")
    );
}

#[tokio::test]
async fn test_alternation_finds_files_with_either_branch() {
    let forge = Arc::new(MemoryForge::new());
    forge.seed_repo("acme/api", "main", &[("a.txt", "foo\n")]);
    forge.seed_repo("acme/web", "main", &[("b.txt", "barbaz\n")]);
    let target = parse_target("acme").unwrap();
    let instructions = parse_instructions("s/foo|barbaz/x/").unwrap();
    let mut operator = accept_one_file(accept_one_file(ScriptedOperator::new()));

    let report = pipeline(&forge, pull_request_config())
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits.len(), 2);
    assert_eq!(
        forge.file_on_branch("acme/api", BRANCH, "a.txt").as_deref(),
        Some("x\n")
    );
    assert_eq!(
        forge.file_on_branch("acme/web", BRANCH, "b.txt").as_deref(),
        Some("x\n")
    );
}

#[tokio::test]
async fn test_optional_group_is_not_required_by_search() {
    let forge = Arc::new(MemoryForge::new());
    forge.seed_repo("acme/api", "main", &[("a.txt", "xyz\n")]);
    let target = parse_target("acme").unwrap();
    let instructions = parse_instructions("s/(abc)?xyz/q/").unwrap();
    let mut operator = accept_one_file(ScriptedOperator::new());

    let report = pipeline(&forge, pull_request_config())
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits.len(), 1);
    assert_eq!(
        forge.file_on_branch("acme/api", BRANCH, "a.txt").as_deref(),
        Some("q\n")
    );
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let forge = two_repos();
    let target = parse_target("acme").unwrap();
    let instructions = parse_instructions("s/foo/bar/").unwrap();
    let mut operator = accept_one_file(ScriptedOperator::new()).then_confirm(false);

    let report = pipeline(&forge, pull_request_config())
        .run(&target, &instructions, &mut operator)
        .await
        .unwrap();

    let json = report.to_json().unwrap();
    assert!(json.contains("\"declined\""));
    assert!(json.contains("acme/api"));
}
