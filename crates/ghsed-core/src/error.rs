//! Error taxonomy for the ghsed pipeline.
//!
//! Each stage returns `GhsedResult`. Whether an error is recovered (logged
//! and the unit skipped) or aborts the run is decided by the stage itself:
//! search and fetch failures are recovered, branch/commit/publish failures
//! abort.

use ghsed_forge::ForgeError;
use thiserror::Error;

use crate::instruction::InstructionError;

/// ghsed errors.
#[derive(Debug, Error)]
pub enum GhsedError {
    /// Missing scope, missing instructions or an unusable setting.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No usable credentials were found.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The scope string does not name an owner, or its file glob is invalid.
    #[error("invalid target '{scope}': {reason}")]
    InvalidTarget { scope: String, reason: String },

    #[error("invalid instruction: {0}")]
    Instruction(#[from] InstructionError),

    /// Looking up the destination branch failed with something other than not-found.
    #[error("could not resolve branch '{branch}' in {repo}: {source}")]
    Branch {
        repo: String,
        branch: String,
        source: ForgeError,
    },

    /// Writing blobs, tree, commit or ref failed.
    #[error("commit to {repo} failed: {source}")]
    Commit { repo: String, source: ForgeError },

    /// Opening (or finding) the pull request failed.
    #[error("pull request for {repo} failed: {source}")]
    Publish { repo: String, source: ForgeError },

    #[error("forge error: {0}")]
    Forge(#[from] ForgeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GhsedError {
    /// Forge payload behind a branch/commit/publish failure, if any.
    pub fn forge_detail(&self) -> Option<&ForgeError> {
        match self {
            GhsedError::Branch { source, .. }
            | GhsedError::Commit { source, .. }
            | GhsedError::Publish { source, .. }
            | GhsedError::Forge(source) => Some(source),
            _ => None,
        }
    }
}

/// Result type for ghsed operations.
pub type GhsedResult<T> = std::result::Result<T, GhsedError>;
