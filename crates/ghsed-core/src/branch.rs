//! Branch reconciler: reuse the destination branch or create it.

use ghsed_forge::{BranchRef, ForgeClient, RepoName};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GhsedError, GhsedResult};

/// A destination branch, normalized to its head commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedBranch {
    pub name: String,
    pub head_sha: String,
    /// Whether the branch was created by this resolution
    pub created: bool,
}

impl ResolvedBranch {
    fn from_ref(name: &str, branch: BranchRef) -> Self {
        ResolvedBranch {
            name: name.to_string(),
            head_sha: branch.head_sha().to_string(),
            created: branch.was_created(),
        }
    }
}

/// Fetch branch `name`, or create it from the default branch if it does not exist.
///
/// Only a not-found answer leads to creation; any other lookup failure is
/// returned as `GhsedError::Branch`.
pub async fn resolve_branch(
    name: &str,
    repo: &RepoName,
    client: &dyn ForgeClient,
) -> GhsedResult<ResolvedBranch> {
    let branch_error = |source| GhsedError::Branch {
        repo: repo.full_name(),
        branch: name.to_string(),
        source,
    };

    match client.get_branch(repo, name).await {
        Ok(existing) => {
            debug!(repo = %repo, branch = name, "reusing existing branch");
            Ok(ResolvedBranch::from_ref(name, existing))
        }
        Err(e) if e.is_not_found() => {
            let default_branch = client
                .get_default_branch(repo)
                .await
                .map_err(branch_error)?;
            let created = client
                .create_branch(repo, &default_branch, name)
                .await
                .map_err(branch_error)?;
            info!(repo = %repo, branch = name, from = %default_branch, "created branch");
            Ok(ResolvedBranch::from_ref(name, created))
        }
        Err(e) => Err(branch_error(e)),
    }
}
