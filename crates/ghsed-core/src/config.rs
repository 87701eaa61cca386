//! Run configuration and the optional settings file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GhsedError, GhsedResult};

pub const DEFAULT_COMMIT_MESSAGE: &str = "ghsed find/replace";
pub const DEFAULT_PR_TITLE: &str = "Mass find and replace via ghsed";
pub const DEFAULT_PR_BODY: &str =
    "Automated find and replace via ghsed.\n\nInvocation:\n\n```\n{invocation}\n```";
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Where confirmed changes land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum RunMode {
    /// Commit to a side branch and open a pull request.
    PullRequest,
    /// Commit straight to a branch; `branch` overrides the suggested name.
    InPlace { branch: Option<String> },
}

impl RunMode {
    pub fn is_in_place(&self) -> bool {
        matches!(self, RunMode::InPlace { .. })
    }
}

/// `ghsed-<UTC timestamp>`
pub fn default_branch_name(now: DateTime<Utc>) -> String {
    format!("ghsed-{}", now.format("%Y%m%d%H%M%S"))
}

/// Run-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub mode: RunMode,
    /// Branch name offered for the first repository
    pub branch: String,
    pub commit_message: String,
    pub pr_title: String,
    /// Pull request body; `{invocation}` is replaced by the command line
    pub pr_body: String,
    pub invocation: String,
    /// Maximum concurrent file fetches per repository
    pub concurrency: usize,
    /// Unchanged lines shown around each diff hunk
    pub context_lines: usize,
}

impl RunConfig {
    pub fn new(invocation: impl Into<String>) -> Self {
        RunConfig {
            mode: RunMode::PullRequest,
            branch: default_branch_name(Utc::now()),
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            pr_title: DEFAULT_PR_TITLE.to_string(),
            pr_body: DEFAULT_PR_BODY.to_string(),
            invocation: invocation.into(),
            concurrency: DEFAULT_CONCURRENCY,
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Overlay values from a settings file.
    pub fn apply_settings(mut self, settings: &Settings) -> Self {
        if let Some(branch) = &settings.branch {
            self.branch = branch.clone();
        }
        if let Some(message) = &settings.commit_message {
            self.commit_message = message.clone();
        }
        if let Some(title) = &settings.pr_title {
            self.pr_title = title.clone();
        }
        if let Some(body) = &settings.pr_body {
            self.pr_body = body.clone();
        }
        if let Some(concurrency) = settings.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(context) = settings.context_lines {
            self.context_lines = context;
        }
        self
    }

    pub fn is_in_place(&self) -> bool {
        self.mode.is_in_place()
    }

    /// Branch suggested for the first repository.
    ///
    /// `None` means "suggest each repository's own default branch", which is
    /// the in-place behaviour when no branch was given.
    pub fn initial_branch(&self) -> Option<String> {
        match &self.mode {
            RunMode::PullRequest => Some(self.branch.clone()),
            RunMode::InPlace { branch } => branch.clone(),
        }
    }

    pub fn pull_request_body(&self) -> String {
        self.pr_body.replace("{invocation}", &self.invocation)
    }

    pub fn validate(&self) -> GhsedResult<()> {
        if self.branch.trim().is_empty() {
            return Err(GhsedError::Configuration(
                "branch name must not be empty".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(GhsedError::Configuration(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Optional TOML settings file. Every field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub username: Option<String>,
    pub branch: Option<String>,
    pub commit_message: Option<String>,
    pub pr_title: Option<String>,
    pub pr_body: Option<String>,
    pub concurrency: Option<usize>,
    pub context_lines: Option<usize>,
}

impl Settings {
    /// `$XDG_CONFIG_HOME/ghsed/config.toml` (or the platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ghsed").join("config.toml"))
    }

    pub fn parse(text: &str) -> GhsedResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read settings from `path`.
    pub fn load(path: &Path) -> GhsedResult<Self> {
        let text = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loaded settings");
        Self::parse(&text)
    }

    /// Read an explicit path (must exist) or the default path (may be absent).
    pub fn discover(explicit: Option<&Path>) -> GhsedResult<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }
}
