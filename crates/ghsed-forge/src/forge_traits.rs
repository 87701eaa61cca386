//! Forge capability set consumed by the ghsed pipeline
//!
//! `ForgeClient` covers exactly what the pipeline needs from a code forge:
//! - code search
//! - repository, branch and ref lookups
//! - git data writes (blob, tree, commit, ref)
//! - pull requests
//!
//! The trait is async and backend-agnostic. `GitHubClient` talks to the
//! GitHub REST API; `fakes::MemoryForge` keeps everything in memory for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ForgeError;

/// Result type for forge operations
pub type ForgeResult<T> = std::result::Result<T, ForgeError>;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A repository identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoName {
    pub owner: String,
    pub name: String,
}

impl RepoName {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse a full name of the form `owner/name`.
    pub fn parse(full_name: &str) -> ForgeResult<Self> {
        match full_name.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(owner, name))
            }
            _ => Err(ForgeError::InvalidRepository(full_name.to_string())),
        }
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// How the client authenticates against the forge.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Token(String),
    Basic { username: String, password: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Credentials::Token(<redacted>)"),
            Credentials::Basic { username, .. } => {
                write!(f, "Credentials::Basic {{ username: {username:?}, password: <redacted> }}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// A file located by code search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    /// `owner/name` of the repository holding the file
    pub repository: String,
    /// Path of the file inside the repository
    pub path: String,
    /// Blob SHA used to fetch the file's content
    pub content_ref: String,
}

// ---------------------------------------------------------------------------
// Branches and git data
// ---------------------------------------------------------------------------

/// A branch reference as returned by the forge.
///
/// Looking up an existing branch and creating a new one yield differently
/// shaped answers; both carry the commit the branch points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BranchRef {
    /// A branch that already existed (`name` + its head commit)
    Existing { name: String, head_sha: String },
    /// A ref that was just created (`refs/heads/<name>` + the object it points at)
    Created { git_ref: String, head_sha: String },
}

impl BranchRef {
    /// The commit SHA at the tip of the branch.
    pub fn head_sha(&self) -> &str {
        match self {
            BranchRef::Existing { head_sha, .. } | BranchRef::Created { head_sha, .. } => head_sha,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, BranchRef::Created { .. })
    }
}

/// Object type of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
    Commit,
}

/// One entry of a git tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    /// File mode, e.g. `100644` or `100755`
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub sha: String,
}

impl TreeEntry {
    /// A regular-file blob entry.
    pub fn blob(path: impl Into<String>, mode: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: mode.into(),
            kind: EntryKind::Blob,
            sha: sha.into(),
        }
    }
}

/// A (recursively listed) git tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub sha: String,
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn entry(&self, path: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.path == path)
    }
}

// ---------------------------------------------------------------------------
// Pull requests
// ---------------------------------------------------------------------------

/// Parameters for opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    /// `owner:branch`
    pub head: String,
    pub base: String,
}

/// A pull request as reported by the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub head: String,
    pub base: String,
    pub title: String,
}

// ---------------------------------------------------------------------------
// ForgeClient
// ---------------------------------------------------------------------------

/// Capability set the pipeline needs from a code forge.
///
/// Contract:
/// - `get_branch` returns `ForgeError::NotFound` when the branch is absent;
///   any other error means the lookup itself failed.
/// - `get_blob` returns the decoded content. Non-UTF-8 payloads come back as
///   their lossy string representation.
/// - `update_ref` never forces: it only fast-forwards the branch.
#[async_trait]
pub trait ForgeClient: Send + Sync {
    /// Run one code-search query and return every located file.
    async fn search_code(&self, query: &str) -> ForgeResult<Vec<SearchMatch>>;

    /// Name of the repository's default branch.
    async fn get_default_branch(&self, repo: &RepoName) -> ForgeResult<String>;

    /// Look up a branch by name.
    async fn get_branch(&self, repo: &RepoName, name: &str) -> ForgeResult<BranchRef>;

    /// Create branch `name` pointing at the head of `from_branch`.
    async fn create_branch(
        &self,
        repo: &RepoName,
        from_branch: &str,
        name: &str,
    ) -> ForgeResult<BranchRef>;

    /// Recursively list the tree of a commit (or tree) SHA.
    async fn get_tree(&self, repo: &RepoName, sha: &str) -> ForgeResult<Tree>;

    /// Fetch the content of a blob.
    async fn get_blob(&self, repo: &RepoName, sha: &str) -> ForgeResult<String>;

    /// Store `content` as a blob and return its SHA.
    async fn create_blob(&self, repo: &RepoName, content: &str) -> ForgeResult<String>;

    /// Create a tree from `base_tree` plus `entries`, returning its SHA.
    async fn create_tree(
        &self,
        repo: &RepoName,
        entries: &[TreeEntry],
        base_tree: &str,
    ) -> ForgeResult<String>;

    /// Create a commit with a single parent, returning its SHA.
    async fn create_commit(
        &self,
        repo: &RepoName,
        parent_sha: &str,
        tree_sha: &str,
        message: &str,
    ) -> ForgeResult<String>;

    /// Move `refs/heads/<branch>` to `sha` (non-force).
    async fn update_ref(&self, repo: &RepoName, branch: &str, sha: &str) -> ForgeResult<()>;

    /// Open a pull request.
    async fn create_pull_request(
        &self,
        repo: &RepoName,
        request: &NewPullRequest,
    ) -> ForgeResult<PullRequest>;

    /// Find an open pull request for `head` (`owner:branch`) into `base`.
    async fn find_pull_request(
        &self,
        repo: &RepoName,
        head: &str,
        base: &str,
    ) -> ForgeResult<Option<PullRequest>>;
}
