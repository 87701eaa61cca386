//! ghsed-forge: Code-forge access for ghsed
//!
//! This crate is the only place that talks to a code forge. It defines the
//! capability set the pipeline depends on and ships two implementations.
//!
//! ## Key Components
//!
//! - `ForgeClient`: async capability trait (search, branches, git data, pull requests)
//! - `GitHubClient`: REST implementation for github.com and GitHub Enterprise
//! - `fakes::MemoryForge`: in-memory implementation with failure injection, for tests

mod error;
pub mod fakes;
pub mod forge_traits;
pub mod github;

pub use error::ForgeError;
pub use forge_traits::{
    BranchRef, Credentials, EntryKind, ForgeClient, ForgeResult, NewPullRequest, PullRequest,
    RepoName, SearchMatch, Tree, TreeEntry,
};
pub use github::{GitHubClient, GitHubConfig, DEFAULT_API_URL};
