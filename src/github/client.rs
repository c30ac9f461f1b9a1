use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use urlencoding::encode;

use super::error::GitHubError;
use super::models::{
    ApiMessage, CompareResponse, GitCommit, HookConfig, HookResponse, LabelsRequest, NewHook,
    NewPullRequest, PullRequestResponse, RepoCommit, RepositoryResponse,
};
use super::{ChangeDescriptor, CodeHost, CreatedPullRequest, DiffSummary, PullRequestOptions};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("prwright/", env!("CARGO_PKG_VERSION"));
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";
const MAX_PATCH_CHARS: usize = 2_000;

pub const CONTRIBUTING_PATHS: [&str; 5] = [
    "CONTRIBUTING.md",
    ".github/CONTRIBUTING.md",
    "docs/CONTRIBUTING.md",
    "CONTRIBUTING",
    ".github/CONTRIBUTING",
];

/// Minimal GitHub REST v3 client authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Result<Self, GitHubError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        self.request_accepting(method, endpoint, JSON_MEDIA_TYPE)
    }

    fn request_accepting(&self, method: Method, endpoint: &str, accept: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, endpoint))
            .bearer_auth(&self.token)
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(&self, builder: RequestBuilder, endpoint: &str) -> Result<Response, GitHubError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiMessage>(&text)
            .map(|m| m.message)
            .unwrap_or(text);

        Err(GitHubError::Status {
            status: status.as_u16(),
            endpoint: endpoint.to_string(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, GitHubError> {
        let response = self.send(self.request(Method::GET, endpoint), endpoint).await?;
        decode(response, endpoint).await
    }

    pub async fn list_hooks(&self, owner: &str, repo: &str) -> Result<Vec<(u64, String)>, GitHubError> {
        let endpoint = repo_endpoint(owner, repo, &["hooks"]);
        let hooks: Vec<HookResponse> = self.get_json(&endpoint).await?;
        Ok(hooks
            .into_iter()
            .filter_map(|hook| hook.config.url.map(|url| (hook.id, url)))
            .collect())
    }

    pub async fn create_push_hook(
        &self,
        owner: &str,
        repo: &str,
        url: &str,
        secret: Option<&str>,
    ) -> Result<u64, GitHubError> {
        let endpoint = repo_endpoint(owner, repo, &["hooks"]);
        let body = NewHook {
            name: "web",
            active: true,
            events: &["push"],
            config: HookConfig {
                url: Some(url.to_string()),
                content_type: Some("json".to_string()),
                secret: secret.map(str::to_string),
            },
        };

        let response = self
            .send(self.request(Method::POST, &endpoint).json(&body), &endpoint)
            .await?;
        let hook: HookResponse = decode(response, &endpoint).await?;
        Ok(hook.id)
    }

    pub async fn delete_hook(&self, owner: &str, repo: &str, id: u64) -> Result<(), GitHubError> {
        let endpoint = repo_endpoint(owner, repo, &["hooks", &id.to_string()]);
        self.send(self.request(Method::DELETE, &endpoint), &endpoint)
            .await?;
        Ok(())
    }

    async fn add_labels(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        labels: &[String],
    ) -> Result<(), GitHubError> {
        let endpoint = repo_endpoint(owner, repo, &["issues", &number.to_string(), "labels"]);
        self.send(
            self.request(Method::POST, &endpoint)
                .json(&LabelsRequest { labels }),
            &endpoint,
        )
        .await?;
        Ok(())
    }

    async fn fetch_raw(&self, endpoint: &str) -> Result<String, GitHubError> {
        let builder = self.request_accepting(Method::GET, endpoint, RAW_MEDIA_TYPE);
        let response = self.send(builder, endpoint).await?;
        Ok(response.text().await?)
    }
}

async fn decode<T: DeserializeOwned>(response: Response, endpoint: &str) -> Result<T, GitHubError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| GitHubError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

/// `/repos/{owner}/{repo}` followed by `segments`, each percent-encoded so
/// branch names such as `fix#12` stay a single path segment.
fn repo_endpoint(owner: &str, repo: &str, segments: &[&str]) -> String {
    let mut endpoint = format!("/repos/{}/{}", encode(owner), encode(repo));
    for segment in segments {
        endpoint.push('/');
        endpoint.push_str(&encode(segment));
    }
    endpoint
}

/// Full or abbreviated hex object id (SHA-1 or SHA-256).
pub fn is_commit_sha(sha: &str) -> bool {
    (4..=64).contains(&sha.len()) && sha.bytes().all(|b| b.is_ascii_hexdigit())
}

fn truncate_patch(patch: String) -> String {
    if patch.chars().count() <= MAX_PATCH_CHARS {
        return patch;
    }
    let mut cut: String = patch.chars().take(MAX_PATCH_CHARS).collect();
    cut.push_str("\n… (truncated)");
    cut
}

#[async_trait]
impl CodeHost for GitHubClient {
    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        options: &PullRequestOptions,
    ) -> Result<CreatedPullRequest, GitHubError> {
        let endpoint = repo_endpoint(owner, repo, &["pulls"]);
        let body = NewPullRequest {
            title: &options.title,
            body: &options.description,
            head: &options.branch,
            base: &options.base_branch,
            maintainer_can_modify: true,
        };

        let response = self
            .send(self.request(Method::POST, &endpoint).json(&body), &endpoint)
            .await?;
        let pr: PullRequestResponse = decode(response, &endpoint).await?;

        if !options.labels.is_empty() {
            // The PR exists at this point; a labelling failure must not report it as missing.
            if let Err(e) = self.add_labels(owner, repo, pr.number, &options.labels).await {
                warn!(number = pr.number, error = %e, "failed to label pull request");
            }
        }

        Ok(CreatedPullRequest {
            number: pr.number,
            html_url: pr.html_url,
        })
    }

    async fn default_branch(&self, owner: &str, repo: &str) -> Result<String, GitHubError> {
        let repository: RepositoryResponse =
            self.get_json(&repo_endpoint(owner, repo, &[])).await?;
        Ok(repository.default_branch)
    }

    async fn diff(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<DiffSummary, GitHubError> {
        let endpoint = format!(
            "{}/{}...{}",
            repo_endpoint(owner, repo, &["compare"]),
            encode(base),
            encode(head)
        );
        let compare: CompareResponse = self.get_json(&endpoint).await?;
        debug!(base, head, files = compare.files.len(), "retrieved comparison");

        let changes = compare
            .files
            .into_iter()
            .map(|file| {
                (
                    file.filename,
                    ChangeDescriptor {
                        status: file.status,
                        additions: file.additions,
                        deletions: file.deletions,
                        patch: file.patch.map(truncate_patch),
                    },
                )
            })
            .collect();

        Ok(DiffSummary {
            diff_url: compare.diff_url,
            changes,
            commit_messages: compare
                .commits
                .into_iter()
                .map(|c| c.commit.message)
                .collect(),
        })
    }

    async fn commit_message(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<String, GitHubError> {
        if !is_commit_sha(sha) {
            return Err(GitHubError::InvalidSha(sha.to_string()));
        }
        match self
            .get_json::<GitCommit>(&repo_endpoint(owner, repo, &["git", "commits", sha]))
            .await
        {
            Ok(commit) => Ok(commit.message),
            Err(e) if e.is_not_found() => {
                debug!(sha, "commit not found via git data API, trying commits API");
                let commit: RepoCommit = self
                    .get_json(&repo_endpoint(owner, repo, &["commits", sha]))
                    .await?;
                Ok(commit.commit.message)
            }
            Err(e) => Err(e),
        }
    }

    async fn contributing_guide(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Option<String>, GitHubError> {
        let mut last_error = None;

        for path in CONTRIBUTING_PATHS {
            let segments: Vec<&str> = std::iter::once("contents").chain(path.split('/')).collect();
            match self
                .fetch_raw(&repo_endpoint(owner, repo, &segments))
                .await
            {
                Ok(text) if !text.trim().is_empty() => return Ok(Some(text)),
                Ok(_) => continue,
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    debug!(path, error = %e, "contributing guide lookup failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}
