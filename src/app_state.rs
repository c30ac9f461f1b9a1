use std::sync::Arc;
use std::time::Duration;

use crate::ai::{ContentGenerator, OpenAiGenerator};
use crate::cli::ServeArgs;
use crate::github::{CodeHost, GitHubClient};
use crate::pipeline::PrPipeline;
use crate::rate_limit::VisitorLimiter;
use crate::repo_config::RepoConfigStore;

/// Shared server state. Handlers only reach the shared maps through these
/// accessors.
pub struct AppState {
    pipeline: PrPipeline,
    repo_config: RepoConfigStore,
    limiter: Arc<VisitorLimiter>,
    webhook_secret: Option<String>,
    pipeline_timeout: Duration,
}

impl AppState {
    pub fn new(
        code_host: Arc<dyn CodeHost>,
        generator: Arc<dyn ContentGenerator>,
        limiter: Arc<VisitorLimiter>,
        labels: Vec<String>,
    ) -> Self {
        Self {
            pipeline: PrPipeline::new(code_host, generator, labels),
            repo_config: RepoConfigStore::new(),
            limiter,
            webhook_secret: None,
            pipeline_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret.filter(|s| !s.is_empty());
        self
    }

    pub fn with_pipeline_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline_timeout = timeout;
        self
    }

    pub fn pipeline(&self) -> &PrPipeline {
        &self.pipeline
    }

    pub fn code_host(&self) -> &Arc<dyn CodeHost> {
        self.pipeline.code_host()
    }

    pub fn repo_config(&self) -> &RepoConfigStore {
        &self.repo_config
    }

    pub fn limiter(&self) -> &Arc<VisitorLimiter> {
        &self.limiter
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }

    pub fn pipeline_timeout(&self) -> Duration {
        self.pipeline_timeout
    }
}

pub fn build_app_state(args: &ServeArgs) -> Result<AppState, Box<dyn std::error::Error + Send + Sync>> {
    let github = GitHubClient::new(&args.github.github_api_url, &args.github.github_token)?;
    let generator = OpenAiGenerator::new(
        &args.openai_base_url,
        &args.openai_model,
        &args.openai_api_key,
    )?;
    let limiter = Arc::new(VisitorLimiter::new(args.rate_limit()));

    Ok(AppState::new(Arc::new(github), Arc::new(generator), limiter, args.labels())
        .with_webhook_secret(args.webhook_secret.clone())
        .with_pipeline_timeout(args.pipeline_timeout()))
}
