//! Credential resolution.
//!
//! Order: `GITHUB_TOKEN`, then `$HOME/.githubtoken`, then an explicit token
//! (flag, then settings file), then username and password.

use std::path::{Path, PathBuf};

use ghsed_forge::Credentials;
use tracing::debug;

use crate::error::{GhsedError, GhsedResult};

pub const TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const TOKEN_FILE: &str = ".githubtoken";

/// Everything a token or password could come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSources {
    pub env_token: Option<String>,
    pub file_token: Option<String>,
    pub config_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl CredentialSources {
    /// Read the environment token and the home token file.
    ///
    /// `config_token`, `username` and `password` are left for the caller.
    pub fn from_environment() -> Self {
        CredentialSources {
            env_token: std::env::var(TOKEN_ENV).ok(),
            file_token: token_file_path().and_then(|path| read_token_file(&path)),
            ..Default::default()
        }
    }
}

/// `$HOME/.githubtoken`
pub fn token_file_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(TOKEN_FILE))
}

/// Trimmed token file contents; `None` if missing, unreadable or blank.
pub fn read_token_file(path: &Path) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    let token = text.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Pick credentials from `sources` in priority order.
pub fn resolve_credentials(sources: &CredentialSources) -> GhsedResult<Credentials> {
    let token = [
        ("environment", &sources.env_token),
        ("token file", &sources.file_token),
        ("configuration", &sources.config_token),
    ]
    .into_iter()
    .find_map(|(origin, value)| non_blank(value).map(|token| (origin, token)));

    if let Some((origin, token)) = token {
        debug!(origin, "using token credentials");
        return Ok(Credentials::Token(token.to_string()));
    }

    match (non_blank(&sources.username), sources.password.as_deref()) {
        (Some(username), Some(password)) if !password.is_empty() => {
            debug!(username, "using username/password credentials");
            Ok(Credentials::Basic {
                username: username.to_string(),
                password: password.to_string(),
            })
        }
        _ => Err(GhsedError::Authentication(format!(
            "no credentials found: set {TOKEN_ENV}, create ~/{TOKEN_FILE}, pass --token, \
             or pass --username and --password"
        ))),
    }
}
