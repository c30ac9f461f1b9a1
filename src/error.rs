use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::github::GitHubError;
use crate::pipeline::PipelineError;
use crate::repo_config::ConfigError;

/// Errors surfaced to HTTP callers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("repository not configured: POST /config with {{\"repo_url\": \"https://github.com/<owner>/<repo>\"}} first")]
    NotConfigured,

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("rate limit exceeded, retry later")]
    RateLimited,

    #[error("failed to resolve default branch: {0}")]
    DefaultBranchLookup(#[source] GitHubError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("pipeline did not finish within {}s", .0.as_secs())]
    Timeout(Duration),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::InvalidConfig(_) | AppError::NotConfigured => {
                StatusCode::BAD_REQUEST
            }
            AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::DefaultBranchLookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Pipeline(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match &self {
            AppError::Pipeline(e) => json!({ "error": self.to_string(), "step": e.step() }),
            _ => json!({ "error": self.to_string() }),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
