//! Target scope: which owner, repositories and files a run applies to.

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{GhsedError, GhsedResult};

/// Wildcard used for "all repositories" / "all files".
pub const ANY: &str = "*";

/// Parsed `owner[/repo[/file]]` scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub owner: String,
    /// `*`, a single name, or a comma-separated list of names
    pub repo: String,
    /// `*` or a glob over file paths
    pub file: String,
}

impl Target {
    /// Build a target, validating the owner and the file glob.
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        file: impl Into<String>,
    ) -> GhsedResult<Self> {
        let target = Target {
            owner: owner.into(),
            repo: repo.into(),
            file: file.into(),
        };
        target.validate()?;
        Ok(target)
    }

    /// Fails unless the owner is concrete and the file glob compiles.
    pub fn validate(&self) -> GhsedResult<()> {
        let scope = self.to_string();
        if self.owner.is_empty() || self.owner == ANY {
            return Err(GhsedError::InvalidTarget {
                scope,
                reason: "an organization or user name must be specified".to_string(),
            });
        }
        if self.file != ANY {
            Pattern::new(&self.file).map_err(|e| GhsedError::InvalidTarget {
                scope,
                reason: format!("bad file glob: {e}"),
            })?;
        }
        Ok(())
    }

    /// Concrete repository names, empty when every repository is in scope.
    pub fn repos(&self) -> Vec<&str> {
        self.repo
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != ANY)
            .collect()
    }

    /// Whether `path` is selected by the file glob.
    ///
    /// A glob without `/` is also tried against the file's base name.
    pub fn matches_path(&self, path: &str) -> bool {
        if self.file == ANY {
            return true;
        }
        let Ok(pattern) = Pattern::new(&self.file) else {
            return false;
        };
        if pattern.matches(path) {
            return true;
        }
        if !self.file.contains('/') {
            let base = path.rsplit('/').next().unwrap_or(path);
            return pattern.matches(base);
        }
        false
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.owner, self.repo, self.file)
    }
}

/// Parse a scope string: `owner`, `owner/repo` or `owner/repo/file`.
///
/// Everything after the second `/` belongs to the file glob.
pub fn parse_target(scope: &str) -> GhsedResult<Target> {
    let mut parts = scope.trim().splitn(3, '/');
    let owner = parts.next().unwrap_or_default().trim();
    let repo = parts.next().map(str::trim).filter(|s| !s.is_empty());
    let file = parts.next().map(str::trim).filter(|s| !s.is_empty());

    if owner.is_empty() || owner == ANY {
        return Err(GhsedError::InvalidTarget {
            scope: scope.to_string(),
            reason: "an organization or user name must be specified".to_string(),
        });
    }

    Target::new(owner, repo.unwrap_or(ANY), file.unwrap_or(ANY))
}
