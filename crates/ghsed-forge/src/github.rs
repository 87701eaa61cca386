//! GitHub REST API client
//!
//! Implements [`ForgeClient`] against `api.github.com` or a GitHub Enterprise
//! Server (`https://<host>/api/v3`). Code search uses the `search/code`
//! endpoint; all writes go through the low-level git data API so that every
//! change to a repository lands as one commit.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ForgeError;
use crate::forge_traits::{
    BranchRef, Credentials, ForgeClient, ForgeResult, NewPullRequest, PullRequest, RepoName,
    SearchMatch, Tree, TreeEntry,
};

/// Public GitHub API root
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Results per search page (the API maximum)
const SEARCH_PAGE_SIZE: usize = 100;

/// GitHub never returns more than this many search results for one query
const SEARCH_RESULT_CEILING: usize = 1000;

/// GitHub client configuration
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// API root, without trailing slash
    pub api_url: String,
    /// How to authenticate
    pub credentials: Credentials,
    /// Value of the `User-Agent` header (required by GitHub)
    pub user_agent: String,
}

impl GitHubConfig {
    /// Config against the public API.
    pub fn new(credentials: Credentials) -> Self {
        GitHubConfig {
            api_url: DEFAULT_API_URL.to_string(),
            credentials,
            user_agent: format!("ghsed/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Point the client at another API root (GitHub Enterprise, tests).
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }
}

/// GitHub REST client
pub struct GitHubClient {
    config: GitHubConfig,
    http_client: reqwest::Client,
}

impl GitHubClient {
    /// Create a new GitHub client
    pub fn new(config: GitHubConfig) -> ForgeResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(GitHubClient {
            config,
            http_client,
        })
    }

    /// API root in use
    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    fn repo_url(&self, repo: &RepoName, rest: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.config.api_url,
            repo.owner,
            repo.name,
            rest.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .http_client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");

        match &self.config.credentials {
            Credentials::Token(token) => builder.bearer_auth(token),
            Credentials::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
        }
    }

    /// Send a request, mapping 404 to `NotFound` and other failures to `Api`.
    async fn send(&self, builder: RequestBuilder, resource: &str) -> ForgeResult<Response> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ForgeError::NotFound {
                resource: resource.to_string(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(ForgeError::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        resource: &str,
    ) -> ForgeResult<T> {
        let response = self.send(builder, resource).await?;
        Ok(response.json::<T>().await?)
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SearchPage {
    total_count: usize,
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    path: String,
    sha: String,
    repository: SearchRepository,
}

#[derive(Deserialize)]
struct SearchRepository {
    full_name: String,
}

#[derive(Deserialize)]
struct RepositoryDetails {
    default_branch: String,
}

#[derive(Deserialize)]
struct BranchDetails {
    name: String,
    commit: ShaOnly,
}

#[derive(Deserialize)]
struct GitRef {
    #[serde(rename = "ref")]
    git_ref: String,
    object: ShaOnly,
}

#[derive(Deserialize)]
struct ShaOnly {
    sha: String,
}

#[derive(Deserialize)]
struct TreeDetails {
    sha: String,
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct BlobDetails {
    content: String,
    encoding: String,
}

#[derive(Serialize)]
struct CreateTree<'a> {
    base_tree: &'a str,
    tree: &'a [TreeEntry],
}

#[derive(Deserialize)]
struct PullDetails {
    number: u64,
    html_url: String,
    title: String,
    head: PullEnd,
    base: PullEnd,
}

#[derive(Deserialize)]
struct PullEnd {
    label: Option<String>,
    #[serde(rename = "ref")]
    ref_name: String,
}

impl From<PullDetails> for PullRequest {
    fn from(pr: PullDetails) -> Self {
        PullRequest {
            number: pr.number,
            url: pr.html_url,
            head: pr.head.label.unwrap_or(pr.head.ref_name),
            base: pr.base.ref_name,
            title: pr.title,
        }
    }
}

/// Decode a blob payload into text.
///
/// Binary content is not supported; it is returned as its lossy UTF-8
/// representation.
fn decode_blob(blob: BlobDetails) -> ForgeResult<String> {
    let bytes = match blob.encoding.as_str() {
        "base64" => {
            let compact: String = blob
                .content
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| ForgeError::Decode(format!("invalid base64 blob: {e}")))?
        }
        _ => blob.content.into_bytes(),
    };

    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    })
}

/// Percent-encode a ref name for a URL path, keeping its `/` separators.
fn encode_ref(name: &str) -> String {
    name.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl ForgeClient for GitHubClient {
    async fn search_code(&self, query: &str) -> ForgeResult<Vec<SearchMatch>> {
        let url = format!("{}/search/code", self.config.api_url);
        let mut matches = Vec::new();
        let mut page = 1usize;

        loop {
            let builder = self.request(Method::GET, &url).query(&[
                ("q", query.to_string()),
                ("per_page", SEARCH_PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);
            let result: SearchPage = self
                .send_json(builder, &format!("search results for {query}"))
                .await?;

            let received = result.items.len();
            matches.extend(result.items.into_iter().map(|item| SearchMatch {
                repository: item.repository.full_name,
                path: item.path,
                content_ref: item.sha,
            }));

            debug!(query, page, received, total = result.total_count, "search page");

            if received < SEARCH_PAGE_SIZE
                || matches.len() >= result.total_count
                || matches.len() >= SEARCH_RESULT_CEILING
            {
                break;
            }
            page += 1;
        }

        Ok(matches)
    }

    async fn get_default_branch(&self, repo: &RepoName) -> ForgeResult<String> {
        let url = format!("{}/repos/{}/{}", self.config.api_url, repo.owner, repo.name);
        let details: RepositoryDetails = self
            .send_json(self.request(Method::GET, &url), &format!("repository {repo}"))
            .await?;
        Ok(details.default_branch)
    }

    async fn get_branch(&self, repo: &RepoName, name: &str) -> ForgeResult<BranchRef> {
        let url = self.repo_url(repo, &format!("branches/{}", encode_ref(name)));
        let details: BranchDetails = self
            .send_json(
                self.request(Method::GET, &url),
                &format!("branch {repo}:{name}"),
            )
            .await?;
        Ok(BranchRef::Existing {
            name: details.name,
            head_sha: details.commit.sha,
        })
    }

    async fn create_branch(
        &self,
        repo: &RepoName,
        from_branch: &str,
        name: &str,
    ) -> ForgeResult<BranchRef> {
        let source = self.get_branch(repo, from_branch).await?;
        let url = self.repo_url(repo, "git/refs");
        let body = serde_json::json!({
            "ref": format!("refs/heads/{name}"),
            "sha": source.head_sha(),
        });
        let created: GitRef = self
            .send_json(
                self.request(Method::POST, &url).json(&body),
                &format!("refs of {repo}"),
            )
            .await?;
        Ok(BranchRef::Created {
            git_ref: created.git_ref,
            head_sha: created.object.sha,
        })
    }

    async fn get_tree(&self, repo: &RepoName, sha: &str) -> ForgeResult<Tree> {
        let url = self.repo_url(repo, &format!("git/trees/{sha}"));
        let details: TreeDetails = self
            .send_json(
                self.request(Method::GET, &url).query(&[("recursive", "1")]),
                &format!("tree {sha} in {repo}"),
            )
            .await?;
        if details.truncated {
            warn!(repo = %repo, sha, "tree listing was truncated by the forge");
        }
        Ok(Tree {
            sha: details.sha,
            entries: details.tree,
        })
    }

    async fn get_blob(&self, repo: &RepoName, sha: &str) -> ForgeResult<String> {
        let url = self.repo_url(repo, &format!("git/blobs/{sha}"));
        let blob: BlobDetails = self
            .send_json(
                self.request(Method::GET, &url),
                &format!("blob {sha} in {repo}"),
            )
            .await?;
        decode_blob(blob)
    }

    async fn create_blob(&self, repo: &RepoName, content: &str) -> ForgeResult<String> {
        let url = self.repo_url(repo, "git/blobs");
        let body = serde_json::json!({ "content": content, "encoding": "utf-8" });
        let created: ShaOnly = self
            .send_json(
                self.request(Method::POST, &url).json(&body),
                &format!("blobs of {repo}"),
            )
            .await?;
        Ok(created.sha)
    }

    async fn create_tree(
        &self,
        repo: &RepoName,
        entries: &[TreeEntry],
        base_tree: &str,
    ) -> ForgeResult<String> {
        let url = self.repo_url(repo, "git/trees");
        let body = CreateTree {
            base_tree,
            tree: entries,
        };
        let created: ShaOnly = self
            .send_json(
                self.request(Method::POST, &url).json(&body),
                &format!("trees of {repo}"),
            )
            .await?;
        Ok(created.sha)
    }

    async fn create_commit(
        &self,
        repo: &RepoName,
        parent_sha: &str,
        tree_sha: &str,
        message: &str,
    ) -> ForgeResult<String> {
        let url = self.repo_url(repo, "git/commits");
        let body = serde_json::json!({
            "message": message,
            "tree": tree_sha,
            "parents": [parent_sha],
        });
        let created: ShaOnly = self
            .send_json(
                self.request(Method::POST, &url).json(&body),
                &format!("commits of {repo}"),
            )
            .await?;
        Ok(created.sha)
    }

    async fn update_ref(&self, repo: &RepoName, branch: &str, sha: &str) -> ForgeResult<()> {
        let url = self.repo_url(repo, &format!("git/refs/heads/{}", encode_ref(branch)));
        let body = serde_json::json!({ "sha": sha, "force": false });
        self.send(
            self.request(Method::PATCH, &url).json(&body),
            &format!("ref heads/{branch} in {repo}"),
        )
        .await?;
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo: &RepoName,
        request: &NewPullRequest,
    ) -> ForgeResult<PullRequest> {
        let url = self.repo_url(repo, "pulls");
        let created: PullDetails = self
            .send_json(
                self.request(Method::POST, &url).json(request),
                &format!("pull requests of {repo}"),
            )
            .await?;
        Ok(created.into())
    }

    async fn find_pull_request(
        &self,
        repo: &RepoName,
        head: &str,
        base: &str,
    ) -> ForgeResult<Option<PullRequest>> {
        let url = self.repo_url(repo, "pulls");
        let open: Vec<PullDetails> = self
            .send_json(
                self.request(Method::GET, &url)
                    .query(&[("head", head), ("base", base), ("state", "open")]),
                &format!("pull requests of {repo}"),
            )
            .await?;
        Ok(open.into_iter().next().map(PullRequest::from))
    }
}
