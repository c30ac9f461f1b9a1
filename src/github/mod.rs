//! Code-host collaborator: the capability trait the pipeline depends on and
//! its GitHub REST implementation.

pub mod client;
pub mod error;
pub mod models;

use async_trait::async_trait;
use std::collections::BTreeMap;

pub use client::GitHubClient;
pub use error::GitHubError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestOptions {
    pub title: String,
    pub description: String,
    pub branch: String,
    pub base_branch: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPullRequest {
    pub number: u64,
    pub html_url: String,
}

/// Per-file summary of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDescriptor {
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
    pub patch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub diff_url: Option<String>,
    pub changes: BTreeMap<String, ChangeDescriptor>,
    /// Messages of the compared commits, oldest first.
    pub commit_messages: Vec<String>,
}

#[async_trait]
pub trait CodeHost: Send + Sync {
    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        options: &PullRequestOptions,
    ) -> Result<CreatedPullRequest, GitHubError>;

    async fn default_branch(&self, owner: &str, repo: &str) -> Result<String, GitHubError>;

    async fn diff(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<DiffSummary, GitHubError>;

    async fn commit_message(&self, owner: &str, repo: &str, sha: &str)
        -> Result<String, GitHubError>;

    /// `Ok(None)` when the repository has no guide at any conventional path.
    async fn contributing_guide(&self, owner: &str, repo: &str)
        -> Result<Option<String>, GitHubError>;
}
