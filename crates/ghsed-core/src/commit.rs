//! Commit writer: one commit per repository with every confirmed file.

use futures::future::try_join_all;
use ghsed_forge::{ForgeClient, ForgeError, RepoName, TreeEntry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::branch::resolve_branch;
use crate::config::RunConfig;
use crate::error::{GhsedError, GhsedResult};
use crate::review::{FileChange, RepoDecision};

const REGULAR_FILE_MODE: &str = "100644";

/// Why a repository produced no commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The operator answered "no" to the repository
    Declined,
    /// No matched file would change
    NoChanges,
    /// The operator confirmed none of the changed files
    NoConfirmedFiles,
    /// The destination is the default branch and the run is not in-place
    DefaultBranchProtected,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SkipReason::Declined => "declined by operator",
            SkipReason::NoChanges => "no changes",
            SkipReason::NoConfirmedFiles => "no confirmed files",
            SkipReason::DefaultBranchProtected => {
                "refusing to commit to the default branch without --in-place"
            }
        };
        f.write_str(text)
    }
}

/// A commit written to a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    /// `owner/name`
    pub repository: String,
    pub owner: String,
    pub branch: String,
    pub commit_sha: String,
    /// Paths included in the commit
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(CommitResult),
    Skipped(SkipReason),
}

/// Write the confirmed files of `decision` as a single commit.
///
/// Unconfirmed files are left out of the tree, so their content on the branch
/// stays what it was. Nothing is written when no file is confirmed, or when
/// the destination is the default branch outside in-place mode.
pub async fn write_commit(
    decision: &RepoDecision,
    client: &dyn ForgeClient,
    config: &RunConfig,
) -> GhsedResult<CommitOutcome> {
    let repository = decision.repository.as_str();
    let confirmed: Vec<&FileChange> = decision.confirmed_files().collect();

    if confirmed.is_empty() {
        info!(repo = %repository, "no confirmed files; skipping repository");
        return Ok(CommitOutcome::Skipped(SkipReason::NoConfirmedFiles));
    }

    let repo = RepoName::parse(repository)?;
    let commit_error = |source: ForgeError| GhsedError::Commit {
        repo: repository.to_string(),
        source,
    };

    let default_branch = client
        .get_default_branch(&repo)
        .await
        .map_err(commit_error)?;
    if decision.branch == default_branch && !config.is_in_place() {
        warn!(
            repo = %repository,
            branch = %decision.branch,
            "{}; skipping repository",
            SkipReason::DefaultBranchProtected
        );
        return Ok(CommitOutcome::Skipped(SkipReason::DefaultBranchProtected));
    }

    let branch = resolve_branch(&decision.branch, &repo, client).await?;
    let base_tree = client
        .get_tree(&repo, &branch.head_sha)
        .await
        .map_err(commit_error)?;

    let blobs = try_join_all(confirmed.iter().map(|file| {
        let repo = &repo;
        async move {
            let sha = client.create_blob(repo, &file.transformed).await?;
            debug!(repo = %repo, path = %file.path, sha = %sha, "blob created");
            Ok::<_, ForgeError>((*file, sha))
        }
    }))
    .await
    .map_err(commit_error)?;

    let entries: Vec<TreeEntry> = blobs
        .into_iter()
        .map(|(file, sha)| {
            let mode = base_tree
                .entry(&file.path)
                .map(|existing| existing.mode.as_str())
                .unwrap_or(REGULAR_FILE_MODE);
            TreeEntry::blob(file.path.clone(), mode, sha)
        })
        .collect();

    let tree_sha = client
        .create_tree(&repo, &entries, &base_tree.sha)
        .await
        .map_err(commit_error)?;
    let commit_sha = client
        .create_commit(&repo, &branch.head_sha, &tree_sha, &config.commit_message)
        .await
        .map_err(commit_error)?;
    client
        .update_ref(&repo, &branch.name, &commit_sha)
        .await
        .map_err(commit_error)?;

    info!(
        repo = %repository,
        branch = %branch.name,
        commit = %commit_sha,
        files = entries.len(),
        "committed changes"
    );

    Ok(CommitOutcome::Committed(CommitResult {
        repository: repository.to_string(),
        owner: repo.owner.clone(),
        branch: branch.name,
        commit_sha,
        files: entries.into_iter().map(|e| e.path).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use ghsed_forge::fakes::{ForgeCall, MemoryForge};

    fn forge() -> MemoryForge {
        let forge = MemoryForge::new();
        forge.seed_repo(
            "acme/api",
            "master",
            &[("a.txt", "foo\n"), ("b.txt", "foo b\n"), ("keep.txt", "untouched\n")],
        );
        forge
    }

    fn change(path: &str, original: &str, transformed: &str, confirmed: bool) -> FileChange {
        FileChange {
            path: path.to_string(),
            original: original.to_string(),
            transformed: transformed.to_string(),
            confirmed,
        }
    }

    fn decision(branch: &str, files: Vec<FileChange>) -> RepoDecision {
        RepoDecision {
            repository: "acme/api".to_string(),
            branch: branch.to_string(),
            files,
        }
    }

    #[tokio::test]
    async fn test_only_confirmed_files_are_committed() {
        let forge = forge();
        let config = RunConfig::new("ghsed").with_branch("ghsed-1");
        let decision = decision(
            "ghsed-1",
            vec![
                change("a.txt", "foo\n", "bar\n", true),
                change("b.txt", "foo b\n", "bar b\n", false),
            ],
        );

        let result = match write_commit(&decision, &forge, &config).await.unwrap() {
            CommitOutcome::Committed(result) => result,
            other => panic!("expected a commit, got {other:?}"),
        };
        assert_eq!(result.owner, "acme");
        assert_eq!(result.files, vec!["a.txt"]);
        assert_eq!(
            forge.branch_head("acme/api", "ghsed-1"),
            Some(result.commit_sha.clone())
        );
        assert_eq!(
            forge.file_on_branch("acme/api", "ghsed-1", "a.txt").as_deref(),
            Some("bar\n")
        );
        assert_eq!(
            forge.file_on_branch("acme/api", "ghsed-1", "b.txt").as_deref(),
            Some("foo b\n")
        );
        assert_eq!(
            forge.file_on_branch("acme/api", "ghsed-1", "keep.txt").as_deref(),
            Some("untouched\n")
        );
        assert_eq!(
            forge.commit_message("acme/api", &result.commit_sha).as_deref(),
            Some("ghsed find/replace")
        );
        // default branch is untouched
        assert_eq!(
            forge.file_on_branch("acme/api", "master", "a.txt").as_deref(),
            Some("foo\n")
        );
    }

    #[tokio::test]
    async fn test_zero_confirmed_writes_nothing() {
        let forge = forge();
        let config = RunConfig::new("ghsed");
        let decision = decision("ghsed-1", vec![change("a.txt", "foo\n", "bar\n", false)]);

        let outcome = write_commit(&decision, &forge, &config).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Skipped(SkipReason::NoConfirmedFiles));
        assert!(forge.write_calls().is_empty());
        assert!(!forge.has_branch("acme/api", "ghsed-1"));
    }

    #[tokio::test]
    async fn test_default_branch_is_protected_outside_in_place() {
        let forge = forge();
        let config = RunConfig::new("ghsed").with_branch("master");
        let decision = decision("master", vec![change("a.txt", "foo\n", "bar\n", true)]);

        for _ in 0..2 {
            let outcome = write_commit(&decision, &forge, &config).await.unwrap();
            assert_eq!(
                outcome,
                CommitOutcome::Skipped(SkipReason::DefaultBranchProtected)
            );
        }
        assert!(forge.write_calls().is_empty());
    }

    #[tokio::test]
    async fn test_in_place_commits_to_default_branch() {
        let forge = forge();
        let config = RunConfig::new("ghsed").with_mode(RunMode::InPlace { branch: None });
        let decision = decision("master", vec![change("a.txt", "foo\n", "bar\n", true)]);

        let outcome = write_commit(&decision, &forge, &config).await.unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed(_)));
        assert_eq!(
            forge.file_on_branch("acme/api", "master", "a.txt").as_deref(),
            Some("bar\n")
        );
        assert!(!forge
            .write_calls()
            .iter()
            .any(|c| matches!(c, ForgeCall::CreateBranch { .. })));
    }

    #[tokio::test]
    async fn test_write_order_is_blobs_tree_commit_ref() {
        let forge = forge();
        let config = RunConfig::new("ghsed");
        let decision = decision(
            "ghsed-1",
            vec![
                change("a.txt", "foo\n", "bar\n", true),
                change("b.txt", "foo b\n", "bar b\n", true),
            ],
        );
        write_commit(&decision, &forge, &config).await.unwrap();

        let kinds: Vec<&str> = forge
            .write_calls()
            .iter()
            .map(|c| match c {
                ForgeCall::CreateBranch { .. } => "branch",
                ForgeCall::CreateBlob { .. } => "blob",
                ForgeCall::CreateTree { .. } => "tree",
                ForgeCall::CreateCommit { .. } => "commit",
                ForgeCall::UpdateRef { .. } => "ref",
                ForgeCall::CreatePullRequest { .. } => "pr",
            })
            .collect();
        assert_eq!(kinds, vec!["branch", "blob", "blob", "tree", "commit", "ref"]);
    }

    #[tokio::test]
    async fn test_commit_failure_is_fatal_with_forge_detail() {
        let forge = forge();
        forge.fail_commits("acme/api");
        let config = RunConfig::new("ghsed");
        let decision = decision("ghsed-1", vec![change("a.txt", "foo\n", "bar\n", true)]);

        let err = write_commit(&decision, &forge, &config).await.unwrap_err();
        assert!(matches!(err, GhsedError::Commit { .. }));
        assert!(err.to_string().contains("commit could not be written"));
    }
}
