//! In-memory doubles for the collaborator traits (testing only).
//!
//! Failures are configured as `Err(())` and surface as a 500 `GitHubError`
//! or a 503 `GeneratorError`.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::ai::{ContentGenerator, GeneratorError, PrContent, RepoInfo};
use crate::github::{
    CodeHost, CreatedPullRequest, DiffSummary, GitHubError, PullRequestOptions,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DefaultBranch,
    Diff(String, String),
    CommitMessage(String),
    ContributingGuide,
    CreatePullRequest,
}

fn upstream_error(endpoint: &str) -> GitHubError {
    GitHubError::Status {
        status: 500,
        endpoint: endpoint.to_string(),
        message: "fake failure".to_string(),
    }
}

pub struct FakeCodeHost {
    default_branch: Result<String, ()>,
    diff: Result<DiffSummary, ()>,
    commit_message: Result<String, ()>,
    contributing_guide: Result<Option<String>, ()>,
    create_fails: bool,
    calls: Mutex<Vec<Call>>,
    created: Mutex<Option<PullRequestOptions>>,
}

impl FakeCodeHost {
    pub fn new() -> Self {
        Self {
            default_branch: Ok("main".to_string()),
            diff: Ok(DiffSummary::default()),
            commit_message: Ok("commit message".to_string()),
            contributing_guide: Ok(None),
            create_fails: false,
            calls: Mutex::new(Vec::new()),
            created: Mutex::new(None),
        }
    }

    pub fn with_default_branch(mut self, result: Result<String, ()>) -> Self {
        self.default_branch = result;
        self
    }

    pub fn with_diff(mut self, result: Result<DiffSummary, ()>) -> Self {
        self.diff = result;
        self
    }

    pub fn with_commit_message(mut self, result: Result<String, ()>) -> Self {
        self.commit_message = result;
        self
    }

    pub fn with_contributing_guide(mut self, result: Result<Option<String>, ()>) -> Self {
        self.contributing_guide = result;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.create_fails = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created(&self) -> Option<PullRequestOptions> {
        self.created.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CodeHost for FakeCodeHost {
    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        options: &PullRequestOptions,
    ) -> Result<CreatedPullRequest, GitHubError> {
        self.record(Call::CreatePullRequest);
        if self.create_fails {
            return Err(upstream_error("pulls"));
        }
        *self.created.lock().unwrap() = Some(options.clone());
        Ok(CreatedPullRequest {
            number: 1,
            html_url: format!("https://github.com/{owner}/{repo}/pull/1"),
        })
    }

    async fn default_branch(&self, _owner: &str, _repo: &str) -> Result<String, GitHubError> {
        self.record(Call::DefaultBranch);
        self.default_branch
            .clone()
            .map_err(|_| upstream_error("repository"))
    }

    async fn diff(
        &self,
        _owner: &str,
        _repo: &str,
        base: &str,
        head: &str,
    ) -> Result<DiffSummary, GitHubError> {
        self.record(Call::Diff(base.to_string(), head.to_string()));
        self.diff.clone().map_err(|_| upstream_error("compare"))
    }

    async fn commit_message(
        &self,
        _owner: &str,
        _repo: &str,
        sha: &str,
    ) -> Result<String, GitHubError> {
        self.record(Call::CommitMessage(sha.to_string()));
        self.commit_message
            .clone()
            .map_err(|_| upstream_error("commit"))
    }

    async fn contributing_guide(
        &self,
        _owner: &str,
        _repo: &str,
    ) -> Result<Option<String>, GitHubError> {
        self.record(Call::ContributingGuide);
        self.contributing_guide
            .clone()
            .map_err(|_| upstream_error("contents"))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Succeed,
    Fail,
    Stall,
}

pub struct FakeGenerator {
    outcome: Outcome,
    seen: Mutex<Vec<RepoInfo>>,
}

impl FakeGenerator {
    fn with_outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::with_outcome(Outcome::Succeed)
    }

    pub fn failing() -> Self {
        Self::with_outcome(Outcome::Fail)
    }

    /// Never answers, like a model call that hangs.
    pub fn stalled() -> Self {
        Self::with_outcome(Outcome::Stall)
    }

    pub fn last_info(&self) -> Option<RepoInfo> {
        self.seen.lock().unwrap().last().cloned()
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn generate(&self, info: &RepoInfo) -> Result<PrContent, GeneratorError> {
        self.seen.lock().unwrap().push(info.clone());
        match self.outcome {
            Outcome::Succeed => Ok(PrContent {
                title: format!("Update {}", info.branch_name),
                description: format!("Context:\n{}", info.commit_message),
            }),
            Outcome::Fail => Err(GeneratorError::Status {
                status: 503,
                body: "fake failure".to_string(),
            }),
            Outcome::Stall => std::future::pending().await,
        }
    }
}
