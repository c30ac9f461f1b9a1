//! Push-event-to-pull-request orchestration.
//!
//! Steps 1-3 (default branch, change context, contributing guide) degrade to
//! fallbacks on upstream failure. Steps 4-5 (content generation, PR creation)
//! abort the run and surface the first error.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::ai::{ContentGenerator, GeneratorError, RepoInfo};
use crate::github::{CodeHost, CreatedPullRequest, GitHubError, PullRequestOptions};
use crate::repo_config::{RepoConfigStore, RepositoryConfig};

pub const FALLBACK_DEFAULT_BRANCH: &str = "main";
pub const GENERIC_CHANGE_MESSAGE: &str =
    "Changes pushed to this branch (no diff or commit message could be retrieved).";
pub const CHANGED_FILES_MESSAGE: &str = "See changed files.";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("content generation failed: {0}")]
    Generation(#[source] GeneratorError),

    #[error("pull request creation failed: {0}")]
    CreatePullRequest(#[source] GitHubError),
}

impl PipelineError {
    pub fn step(&self) -> &'static str {
        match self {
            PipelineError::Generation(_) => "generate_content",
            PipelineError::CreatePullRequest(_) => "create_pull_request",
        }
    }
}

/// The branch and commit a push refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub branch: String,
    pub sha: String,
}

pub struct PrPipeline {
    code_host: Arc<dyn CodeHost>,
    generator: Arc<dyn ContentGenerator>,
    labels: Vec<String>,
}

impl PrPipeline {
    pub fn new(
        code_host: Arc<dyn CodeHost>,
        generator: Arc<dyn ContentGenerator>,
        labels: Vec<String>,
    ) -> Self {
        Self {
            code_host,
            generator,
            labels,
        }
    }

    pub fn code_host(&self) -> &Arc<dyn CodeHost> {
        &self.code_host
    }

    #[instrument(
        skip_all,
        fields(repo = %config.full_name(), branch = %target.branch, sha = %target.sha)
    )]
    pub async fn run(
        &self,
        config: &RepositoryConfig,
        store: &RepoConfigStore,
        target: &PushTarget,
    ) -> Result<CreatedPullRequest, PipelineError> {
        let base_branch = self.resolve_default_branch(config, store).await;
        let mut repo_info = self.gather_change_context(config, &base_branch, target).await;
        repo_info.contributing_guide = self.gather_contributing_guide(config).await;

        info!("generating pull request content");
        let content = self
            .generator
            .generate(&repo_info)
            .await
            .map_err(PipelineError::Generation)?;

        let options = PullRequestOptions {
            title: content.title,
            description: with_commit_trailer(&content.description, &target.sha),
            branch: target.branch.clone(),
            base_branch,
            labels: self.labels.clone(),
        };

        info!(title = %options.title, base = %options.base_branch, "creating pull request");
        let pr = self
            .code_host
            .create_pull_request(&config.owner, &config.name, &options)
            .await
            .map_err(PipelineError::CreatePullRequest)?;

        info!(number = pr.number, url = %pr.html_url, "pull request created");
        Ok(pr)
    }

    async fn resolve_default_branch(
        &self,
        config: &RepositoryConfig,
        store: &RepoConfigStore,
    ) -> String {
        match self
            .code_host
            .default_branch(&config.owner, &config.name)
            .await
        {
            Ok(branch) if !branch.is_empty() => {
                if !store.update_default_branch(&config.owner, &config.name, &branch) {
                    debug!("active repository changed mid-push, default branch not stored");
                }
                branch
            }
            Ok(_) => {
                warn!(fallback = FALLBACK_DEFAULT_BRANCH, "code host reported an empty default branch");
                FALLBACK_DEFAULT_BRANCH.to_string()
            }
            Err(e) => {
                warn!(error = %e, fallback = FALLBACK_DEFAULT_BRANCH, "default branch lookup failed");
                FALLBACK_DEFAULT_BRANCH.to_string()
            }
        }
    }

    /// Diff first, then the pushed commit's message, then a generic message.
    async fn gather_change_context(
        &self,
        config: &RepositoryConfig,
        base_branch: &str,
        target: &PushTarget,
    ) -> RepoInfo {
        let mut info = RepoInfo {
            branch_name: target.branch.clone(),
            ..RepoInfo::default()
        };

        match self
            .code_host
            .diff(&config.owner, &config.name, base_branch, &target.branch)
            .await
        {
            Ok(diff) => {
                info.changes = diff.changes;
                info.diff_url = diff.diff_url;
                info.commit_message = diff.commit_messages.last().cloned().unwrap_or_default();
            }
            Err(e) => {
                warn!(error = %e, base = base_branch, "diff unavailable, falling back to commit message");
                info.commit_message = self.fetch_commit_message(config, &target.sha).await;
            }
        }

        if info.commit_message.trim().is_empty() {
            info.commit_message = if info.changes.is_empty() {
                GENERIC_CHANGE_MESSAGE
            } else {
                CHANGED_FILES_MESSAGE
            }
            .to_string();
        }
        info
    }

    async fn fetch_commit_message(&self, config: &RepositoryConfig, sha: &str) -> String {
        if sha.is_empty() {
            return String::new();
        }
        match self
            .code_host
            .commit_message(&config.owner, &config.name, sha)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "commit message unavailable, using generic context");
                String::new()
            }
        }
    }

    async fn gather_contributing_guide(&self, config: &RepositoryConfig) -> Option<String> {
        match self
            .code_host
            .contributing_guide(&config.owner, &config.name)
            .await
        {
            Ok(guide) => guide,
            Err(e) => {
                warn!(error = %e, "contributing guide lookup failed");
                None
            }
        }
    }
}

fn with_commit_trailer(description: &str, sha: &str) -> String {
    if sha.is_empty() {
        return description.to_string();
    }
    format!("{}\n\nCommit: {sha}", description.trim_end())
}
