//! In-memory forge (testing only)
//!
//! `MemoryForge` satisfies the `ForgeClient` contract without any network
//! access. Repositories are seeded with files on their default branch; object
//! ids are sha2 digests so identical content always gets the same SHA.
//!
//! Every write is appended to a call log so tests can assert exactly what
//! reached the forge, and individual operations can be made to fail.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::ForgeError;
use crate::forge_traits::*;

const DEFAULT_MODE: &str = "100644";

/// A write performed against the fake forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForgeCall {
    CreateBranch {
        repo: String,
        from: String,
        name: String,
    },
    CreateBlob {
        repo: String,
        sha: String,
    },
    CreateTree {
        repo: String,
        sha: String,
    },
    CreateCommit {
        repo: String,
        sha: String,
        parent: String,
    },
    UpdateRef {
        repo: String,
        branch: String,
        sha: String,
    },
    CreatePullRequest {
        repo: String,
        head: String,
        base: String,
    },
}

impl ForgeCall {
    /// Repository the write was aimed at.
    pub fn repo(&self) -> &str {
        match self {
            ForgeCall::CreateBranch { repo, .. }
            | ForgeCall::CreateBlob { repo, .. }
            | ForgeCall::CreateTree { repo, .. }
            | ForgeCall::CreateCommit { repo, .. }
            | ForgeCall::UpdateRef { repo, .. }
            | ForgeCall::CreatePullRequest { repo, .. } => repo,
        }
    }
}

#[derive(Debug)]
struct CommitObject {
    tree: String,
    parent: Option<String>,
    message: String,
}

#[derive(Debug, Default)]
struct RepoState {
    default_branch: String,
    branches: HashMap<String, String>,
    commits: HashMap<String, CommitObject>,
    trees: HashMap<String, Vec<TreeEntry>>,
    blobs: HashMap<String, String>,
    pulls: Vec<PullRequest>,
}

impl RepoState {
    fn tree_of(&self, sha: &str) -> Option<(&str, &Vec<TreeEntry>)> {
        let tree_sha = match self.commits.get(sha) {
            Some(commit) => commit.tree.as_str(),
            None => sha,
        };
        self.trees
            .get_key_value(tree_sha)
            .map(|(k, entries)| (k.as_str(), entries))
    }

    fn file_on(&self, branch: &str, path: &str) -> Option<&TreeEntry> {
        let head = self.branches.get(branch)?;
        let (_, entries) = self.tree_of(head)?;
        entries.iter().find(|e| e.path == path)
    }
}

#[derive(Debug, Default)]
struct Failures {
    search_queries: HashSet<String>,
    blobs: HashSet<String>,
    branch_lookups: HashSet<(String, String)>,
    commit_repos: HashSet<String>,
    pull_repos: HashSet<String>,
}

#[derive(Debug, Default)]
struct ForgeState {
    repos: BTreeMap<String, RepoState>,
    failures: Failures,
    calls: Vec<ForgeCall>,
    next_pull: u64,
}

impl ForgeState {
    fn repo(&self, repo: &RepoName) -> ForgeResult<&RepoState> {
        self.repos
            .get(&repo.full_name())
            .ok_or_else(|| not_found(format!("repository {repo}")))
    }

    fn repo_mut(&mut self, repo: &RepoName) -> ForgeResult<&mut RepoState> {
        self.repos
            .get_mut(&repo.full_name())
            .ok_or_else(|| not_found(format!("repository {repo}")))
    }
}

fn not_found(resource: String) -> ForgeError {
    ForgeError::NotFound { resource }
}

fn api(status: u16, body: impl Into<String>) -> ForgeError {
    ForgeError::Api {
        status,
        body: body.into(),
    }
}

/// Git-style object id: 40 hex chars of sha256 over `kind` and payload.
fn object_id(kind: &str, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload.as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(40);
    id
}

fn tree_id(entries: &[TreeEntry]) -> String {
    let listing: String = entries
        .iter()
        .map(|e| format!("{} {} {}\n", e.mode, e.sha, e.path))
        .collect();
    object_id("tree", &listing)
}

/// Split a search query into owner filter, repository filters and `OR`-ed terms.
fn parse_query(query: &str) -> (Option<String>, Vec<String>, Vec<String>) {
    let mut user = None;
    let mut repos = Vec::new();
    let mut words = Vec::new();

    for token in query.split_whitespace() {
        if let Some(owner) = token.strip_prefix("user:") {
            user = Some(owner.to_string());
        } else if let Some(repo) = token.strip_prefix("repo:") {
            repos.push(repo.to_string());
        } else {
            words.push(token);
        }
    }

    let terms = words
        .join(" ")
        .split(" OR ")
        .map(|term| term.trim().trim_matches('"').to_string())
        .filter(|term| !term.is_empty())
        .collect();
    (user, repos, terms)
}

/// In-memory code forge.
#[derive(Debug, Default)]
pub struct MemoryForge {
    state: Mutex<ForgeState>,
}

impl MemoryForge {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ForgeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -- seeding ------------------------------------------------------------

    /// Create `full_name` with one commit on `default_branch` holding `files`.
    pub fn seed_repo(&self, full_name: &str, default_branch: &str, files: &[(&str, &str)]) {
        let mut repo = RepoState {
            default_branch: default_branch.to_string(),
            ..RepoState::default()
        };

        let mut entries: Vec<TreeEntry> = files
            .iter()
            .map(|(path, content)| {
                let sha = object_id("blob", content);
                repo.blobs.insert(sha.clone(), (*content).to_string());
                TreeEntry::blob(*path, DEFAULT_MODE, sha)
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let tree = tree_id(&entries);
        repo.trees.insert(tree.clone(), entries);

        let message = "Initial commit";
        let commit = object_id("commit", &format!("{tree}\n{message}"));
        repo.commits.insert(
            commit.clone(),
            CommitObject {
                tree,
                parent: None,
                message: message.to_string(),
            },
        );
        repo.branches.insert(default_branch.to_string(), commit);

        self.state().repos.insert(full_name.to_string(), repo);
    }

    /// Add branch `name` pointing at the head of `from_branch`, without logging a write.
    pub fn seed_branch(&self, full_name: &str, from_branch: &str, name: &str) {
        let mut state = self.state();
        if let Some(repo) = state.repos.get_mut(full_name) {
            if let Some(head) = repo.branches.get(from_branch).cloned() {
                repo.branches.insert(name.to_string(), head);
            }
        }
    }

    // -- failure injection --------------------------------------------------

    /// Make `search_code(query)` fail.
    pub fn fail_search(&self, query: &str) {
        self.state().failures.search_queries.insert(query.to_string());
    }

    /// Make `get_blob(sha)` fail in every repository.
    pub fn fail_blob(&self, sha: &str) {
        self.state().failures.blobs.insert(sha.to_string());
    }

    /// Make looking up `branch` in `full_name` fail with a non-404 error.
    pub fn fail_branch_lookup(&self, full_name: &str, branch: &str) {
        self.state()
            .failures
            .branch_lookups
            .insert((full_name.to_string(), branch.to_string()));
    }

    /// Make `create_commit` fail for `full_name`.
    pub fn fail_commits(&self, full_name: &str) {
        self.state().failures.commit_repos.insert(full_name.to_string());
    }

    /// Make `create_pull_request` fail for `full_name`.
    pub fn fail_pull_requests(&self, full_name: &str) {
        self.state().failures.pull_repos.insert(full_name.to_string());
    }

    // -- inspection ---------------------------------------------------------

    /// Content of `path` at the head of `branch`.
    pub fn file_on_branch(&self, full_name: &str, branch: &str, path: &str) -> Option<String> {
        let state = self.state();
        let repo = state.repos.get(full_name)?;
        let entry = repo.file_on(branch, path)?;
        repo.blobs.get(&entry.sha).cloned()
    }

    /// Blob SHA of `path` at the head of `branch`.
    pub fn blob_sha(&self, full_name: &str, branch: &str, path: &str) -> Option<String> {
        let state = self.state();
        let repo = state.repos.get(full_name)?;
        repo.file_on(branch, path).map(|e| e.sha.clone())
    }

    /// File mode of `path` at the head of `branch`.
    pub fn file_mode(&self, full_name: &str, branch: &str, path: &str) -> Option<String> {
        let state = self.state();
        let repo = state.repos.get(full_name)?;
        repo.file_on(branch, path).map(|e| e.mode.clone())
    }

    /// Commit SHA at the tip of `branch`.
    pub fn branch_head(&self, full_name: &str, branch: &str) -> Option<String> {
        let state = self.state();
        state.repos.get(full_name)?.branches.get(branch).cloned()
    }

    pub fn has_branch(&self, full_name: &str, branch: &str) -> bool {
        self.branch_head(full_name, branch).is_some()
    }

    /// Message of commit `sha`.
    pub fn commit_message(&self, full_name: &str, sha: &str) -> Option<String> {
        let state = self.state();
        let commit = state.repos.get(full_name)?.commits.get(sha)?;
        Some(commit.message.clone())
    }

    /// Parent of commit `sha`.
    pub fn commit_parent(&self, full_name: &str, sha: &str) -> Option<String> {
        let state = self.state();
        state.repos.get(full_name)?.commits.get(sha)?.parent.clone()
    }

    /// Every pull request opened against `full_name`.
    pub fn pull_requests(&self, full_name: &str) -> Vec<PullRequest> {
        let state = self.state();
        state
            .repos
            .get(full_name)
            .map(|r| r.pulls.clone())
            .unwrap_or_default()
    }

    /// Writes recorded so far, in order.
    pub fn write_calls(&self) -> Vec<ForgeCall> {
        self.state().calls.clone()
    }
}

#[async_trait]
impl ForgeClient for MemoryForge {
    async fn search_code(&self, query: &str) -> ForgeResult<Vec<SearchMatch>> {
        let state = self.state();
        if state.failures.search_queries.contains(query) {
            return Err(api(503, "search is temporarily unavailable"));
        }

        let (user, repo_filters, terms) = parse_query(query);
        let mut matches = Vec::new();

        for (full_name, repo) in &state.repos {
            let owner = full_name.split('/').next().unwrap_or_default();
            if user.as_deref().is_some_and(|u| u != owner) {
                continue;
            }
            if !repo_filters.is_empty() && !repo_filters.iter().any(|r| r == full_name) {
                continue;
            }
            let Some(head) = repo.branches.get(&repo.default_branch) else {
                continue;
            };
            let Some((_, entries)) = repo.tree_of(head) else {
                continue;
            };
            for entry in entries {
                let hit = repo
                    .blobs
                    .get(&entry.sha)
                    .is_some_and(|content| terms.iter().any(|t| content.contains(t.as_str())));
                if hit {
                    matches.push(SearchMatch {
                        repository: full_name.clone(),
                        path: entry.path.clone(),
                        content_ref: entry.sha.clone(),
                    });
                }
            }
        }

        Ok(matches)
    }

    async fn get_default_branch(&self, repo: &RepoName) -> ForgeResult<String> {
        let state = self.state();
        Ok(state.repo(repo)?.default_branch.clone())
    }

    async fn get_branch(&self, repo: &RepoName, name: &str) -> ForgeResult<BranchRef> {
        let state = self.state();
        if state
            .failures
            .branch_lookups
            .contains(&(repo.full_name(), name.to_string()))
        {
            return Err(api(500, format!("branch lookup for {name} failed")));
        }
        let head = state
            .repo(repo)?
            .branches
            .get(name)
            .ok_or_else(|| not_found(format!("branch {repo}:{name}")))?;
        Ok(BranchRef::Existing {
            name: name.to_string(),
            head_sha: head.clone(),
        })
    }

    async fn create_branch(
        &self,
        repo: &RepoName,
        from_branch: &str,
        name: &str,
    ) -> ForgeResult<BranchRef> {
        let mut state = self.state();
        let state_repo = state.repo_mut(repo)?;
        if state_repo.branches.contains_key(name) {
            return Err(api(422, "Reference already exists"));
        }
        let head = state_repo
            .branches
            .get(from_branch)
            .cloned()
            .ok_or_else(|| not_found(format!("branch {repo}:{from_branch}")))?;
        state_repo.branches.insert(name.to_string(), head.clone());

        state.calls.push(ForgeCall::CreateBranch {
            repo: repo.full_name(),
            from: from_branch.to_string(),
            name: name.to_string(),
        });
        Ok(BranchRef::Created {
            git_ref: format!("refs/heads/{name}"),
            head_sha: head,
        })
    }

    async fn get_tree(&self, repo: &RepoName, sha: &str) -> ForgeResult<Tree> {
        let state = self.state();
        let (tree_sha, entries) = state
            .repo(repo)?
            .tree_of(sha)
            .ok_or_else(|| not_found(format!("tree {sha} in {repo}")))?;
        Ok(Tree {
            sha: tree_sha.to_string(),
            entries: entries.clone(),
        })
    }

    async fn get_blob(&self, repo: &RepoName, sha: &str) -> ForgeResult<String> {
        let state = self.state();
        if state.failures.blobs.contains(sha) {
            return Err(api(500, format!("blob {sha} could not be read")));
        }
        state
            .repo(repo)?
            .blobs
            .get(sha)
            .cloned()
            .ok_or_else(|| not_found(format!("blob {sha} in {repo}")))
    }

    async fn create_blob(&self, repo: &RepoName, content: &str) -> ForgeResult<String> {
        let mut state = self.state();
        let sha = object_id("blob", content);
        state
            .repo_mut(repo)?
            .blobs
            .insert(sha.clone(), content.to_string());
        state.calls.push(ForgeCall::CreateBlob {
            repo: repo.full_name(),
            sha: sha.clone(),
        });
        Ok(sha)
    }

    async fn create_tree(
        &self,
        repo: &RepoName,
        entries: &[TreeEntry],
        base_tree: &str,
    ) -> ForgeResult<String> {
        let mut state = self.state();
        let state_repo = state.repo_mut(repo)?;
        let (_, base) = state_repo
            .tree_of(base_tree)
            .ok_or_else(|| not_found(format!("tree {base_tree} in {repo}")))?;

        let mut merged: BTreeMap<String, TreeEntry> = base
            .iter()
            .map(|e| (e.path.clone(), e.clone()))
            .collect();
        for entry in entries {
            if !state_repo.blobs.contains_key(&entry.sha) {
                return Err(api(422, format!("blob {} does not exist", entry.sha)));
            }
            merged.insert(entry.path.clone(), entry.clone());
        }
        let merged: Vec<TreeEntry> = merged.into_values().collect();

        let sha = tree_id(&merged);
        state_repo.trees.insert(sha.clone(), merged);
        state.calls.push(ForgeCall::CreateTree {
            repo: repo.full_name(),
            sha: sha.clone(),
        });
        Ok(sha)
    }

    async fn create_commit(
        &self,
        repo: &RepoName,
        parent_sha: &str,
        tree_sha: &str,
        message: &str,
    ) -> ForgeResult<String> {
        let mut state = self.state();
        if state.failures.commit_repos.contains(&repo.full_name()) {
            return Err(api(500, "commit could not be written"));
        }
        let state_repo = state.repo_mut(repo)?;
        if !state_repo.trees.contains_key(tree_sha) {
            return Err(api(422, format!("tree {tree_sha} does not exist")));
        }
        if !state_repo.commits.contains_key(parent_sha) {
            return Err(api(422, format!("parent {parent_sha} does not exist")));
        }

        let sha = object_id("commit", &format!("{parent_sha}\n{tree_sha}\n{message}"));
        state_repo.commits.insert(
            sha.clone(),
            CommitObject {
                tree: tree_sha.to_string(),
                parent: Some(parent_sha.to_string()),
                message: message.to_string(),
            },
        );
        state.calls.push(ForgeCall::CreateCommit {
            repo: repo.full_name(),
            sha: sha.clone(),
            parent: parent_sha.to_string(),
        });
        Ok(sha)
    }

    async fn update_ref(&self, repo: &RepoName, branch: &str, sha: &str) -> ForgeResult<()> {
        let mut state = self.state();
        let state_repo = state.repo_mut(repo)?;
        let current = state_repo
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| not_found(format!("ref heads/{branch} in {repo}")))?;
        let parent = state_repo
            .commits
            .get(sha)
            .ok_or_else(|| api(422, format!("object {sha} does not exist")))?
            .parent
            .clone();
        if parent.as_deref() != Some(current.as_str()) {
            return Err(api(422, "Update is not a fast forward"));
        }
        state_repo.branches.insert(branch.to_string(), sha.to_string());

        state.calls.push(ForgeCall::UpdateRef {
            repo: repo.full_name(),
            branch: branch.to_string(),
            sha: sha.to_string(),
        });
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo: &RepoName,
        request: &NewPullRequest,
    ) -> ForgeResult<PullRequest> {
        let mut state = self.state();
        if state.failures.pull_repos.contains(&repo.full_name()) {
            return Err(api(500, "pull request could not be created"));
        }
        state.next_pull += 1;
        let number = state.next_pull;

        let state_repo = state.repo_mut(repo)?;
        if state_repo
            .pulls
            .iter()
            .any(|pr| pr.head == request.head && pr.base == request.base)
        {
            return Err(api(
                422,
                format!("A pull request already exists for {}.", request.head),
            ));
        }
        let pr = PullRequest {
            number,
            url: format!("https://forge.test/{repo}/pull/{number}"),
            head: request.head.clone(),
            base: request.base.clone(),
            title: request.title.clone(),
        };
        state_repo.pulls.push(pr.clone());

        state.calls.push(ForgeCall::CreatePullRequest {
            repo: repo.full_name(),
            head: request.head.clone(),
            base: request.base.clone(),
        });
        Ok(pr)
    }

    async fn find_pull_request(
        &self,
        repo: &RepoName,
        head: &str,
        base: &str,
    ) -> ForgeResult<Option<PullRequest>> {
        let state = self.state();
        Ok(state
            .repo(repo)?
            .pulls
            .iter()
            .find(|pr| pr.head == head && pr.base == base)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_is_stable_and_git_sized() {
        let a = object_id("blob", "hello");
        assert_eq!(a.len(), 40);
        assert_eq!(a, object_id("blob", "hello"));
        assert_ne!(a, object_id("tree", "hello"));
    }

    #[test]
    fn test_parse_query_separates_filters() {
        let (user, repos, terms) = parse_query("repo:acme/api repo:acme/web user:acme \"foo bar\"");
        assert_eq!(user.as_deref(), Some("acme"));
        assert_eq!(repos, vec!["acme/api", "acme/web"]);
        assert_eq!(terms, vec!["foo bar"]);

        let (_, _, terms) = parse_query("user:acme \"old name\" OR legacy_");
        assert_eq!(terms, vec!["old name", "legacy_"]);
    }

    #[tokio::test]
    async fn test_search_respects_owner_and_repo_filters() {
        let forge = MemoryForge::new();
        forge.seed_repo("acme/api", "main", &[("a.txt", "foo")]);
        forge.seed_repo("acme/web", "main", &[("b.txt", "foo")]);
        forge.seed_repo("other/api", "main", &[("c.txt", "foo")]);

        let all = forge.search_code("user:acme foo").await.unwrap();
        assert_eq!(all.len(), 2);

        let one = forge.search_code("repo:acme/web user:acme foo").await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].path, "b.txt");
    }

    #[tokio::test]
    async fn test_update_ref_rejects_non_fast_forward() {
        let forge = MemoryForge::new();
        forge.seed_repo("acme/api", "main", &[("a.txt", "one")]);
        let repo = RepoName::new("acme", "api");
        let head = forge.branch_head("acme/api", "main").unwrap();
        let tree = forge.get_tree(&repo, &head).await.unwrap();

        let c1 = forge
            .create_commit(&repo, &head, &tree.sha, "first")
            .await
            .unwrap();
        forge.update_ref(&repo, "main", &c1).await.unwrap();

        // Still parented on the old head
        let stale = forge
            .create_commit(&repo, &head, &tree.sha, "stale")
            .await
            .unwrap();
        let err = forge.update_ref(&repo, "main", &stale).await.unwrap_err();
        assert!(err.is_unprocessable());
    }
}
