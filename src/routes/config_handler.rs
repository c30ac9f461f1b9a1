use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::app_state::AppState;
use crate::error::AppError;
use crate::repo_config::{RawRepositoryConfig, RepositoryConfig};

/// `POST /config`: sets the active repository.
///
/// The default branch is resolved up front so a bad token or a missing
/// repository shows up here rather than on the first push.
pub async fn config_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let mut raw: RawRepositoryConfig = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid config body: {e}")))?;
    let candidate = RepositoryConfig::from_raw(raw.clone())?;

    let default_branch = state
        .code_host()
        .default_branch(&candidate.owner, &candidate.name)
        .await
        .map_err(|e| {
            error!(repo = %candidate.full_name(), error = %e, "default branch lookup failed");
            AppError::DefaultBranchLookup(e)
        })?;
    raw.default_branch = Some(default_branch);
    let config = state.repo_config().set_config(raw)?;

    info!(
        repo = %config.full_name(),
        default_branch = %config.default_branch,
        "repository configured"
    );
    Ok(Json(json!({
        "status": "config_stored",
        "owner": config.owner,
        "name": config.name,
    })))
}
