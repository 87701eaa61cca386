//! Pull request publisher.

use ghsed_forge::{ForgeClient, NewPullRequest, PullRequest, RepoName};
use tracing::{debug, info};

use crate::commit::CommitResult;
use crate::config::RunConfig;
use crate::error::{GhsedError, GhsedResult};

/// Open a pull request for `commit` into the repository's current default branch.
///
/// Returns `None` in in-place mode. If a pull request for the same head and
/// base is already open, that one is returned instead.
pub async fn publish(
    commit: &CommitResult,
    client: &dyn ForgeClient,
    config: &RunConfig,
) -> GhsedResult<Option<PullRequest>> {
    if config.is_in_place() {
        debug!(repo = %commit.repository, "in-place run; no pull request");
        return Ok(None);
    }

    let repo = RepoName::parse(&commit.repository)?;
    let publish_error = |source| GhsedError::Publish {
        repo: commit.repository.clone(),
        source,
    };

    let base = client
        .get_default_branch(&repo)
        .await
        .map_err(publish_error)?;
    let head = format!("{}:{}", commit.owner, commit.branch);
    let request = NewPullRequest {
        title: config.pr_title.clone(),
        body: config.pull_request_body(),
        head: head.clone(),
        base: base.clone(),
    };

    match client.create_pull_request(&repo, &request).await {
        Ok(pr) => {
            info!(repo = %commit.repository, number = pr.number, url = %pr.url, "opened pull request");
            Ok(Some(pr))
        }
        Err(e) if e.is_unprocessable() => {
            let existing = client
                .find_pull_request(&repo, &head, &base)
                .await
                .map_err(publish_error)?;
            match existing {
                Some(pr) => {
                    info!(repo = %commit.repository, number = pr.number, url = %pr.url, "pull request already open");
                    Ok(Some(pr))
                }
                None => Err(publish_error(e)),
            }
        }
        Err(e) => Err(publish_error(e)),
    }
}
