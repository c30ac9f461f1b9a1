use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::AppError;
use crate::github::client::is_commit_sha;
use crate::github::models::GitHubPushEvent;
use crate::pipeline::PushTarget;
use crate::utils::verify_signature;

const HEADER_EVENT: &str = "x-github-event";
const HEADER_DELIVERY: &str = "x-github-delivery";
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// `POST /push`: turns a push notification into a pull request.
///
/// The whole pipeline runs inside the request. Dropping the connection drops
/// this future and with it any in-flight upstream call.
pub async fn push_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    // 1. With a secret configured every delivery must be signed
    if let Some(secret) = state.webhook_secret() {
        let sig = header_str(&headers, HEADER_SIGNATURE).unwrap_or("");
        if !verify_signature(sig, &body, secret) {
            warn!(signed = !sig.is_empty(), "rejecting push with invalid signature");
            return Err(AppError::InvalidSignature);
        }
    }

    // 2. Non-push GitHub events are acknowledged and dropped
    if let Some(event_type) = header_str(&headers, HEADER_EVENT) {
        if event_type != "push" {
            debug!(event_type, "ignoring webhook event");
            return Ok(ignored(event_type));
        }
    }

    // 3. Decode
    let event = decode_push(&headers, &body)?;
    if event.deleted {
        debug!(git_ref = %event.git_ref, "ignoring branch deletion");
        return Ok(ignored("branch_deleted"));
    }
    let target = PushTarget {
        branch: event.branch_name().to_string(),
        sha: event.after.clone(),
    };
    if target.branch.is_empty() {
        return Err(AppError::BadRequest("push event has an empty ref".to_string()));
    }
    if !target.sha.is_empty() && !is_commit_sha(&target.sha) {
        return Err(AppError::BadRequest(format!(
            "{:?} is not a commit SHA",
            target.sha
        )));
    }

    // 4. Configuration must exist before anything upstream is touched
    let config = state
        .repo_config()
        .get_config()
        .ok_or(AppError::NotConfigured)?;

    let delivery = header_str(&headers, HEADER_DELIVERY)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let span = info_span!("push", %delivery);

    // 5. Orchestrate
    let run = state
        .pipeline()
        .run(&config, state.repo_config(), &target)
        .instrument(span.clone());

    let pr = match tokio::time::timeout(state.pipeline_timeout(), run).await {
        Ok(Ok(pr)) => pr,
        Ok(Err(e)) => {
            span.in_scope(|| error!(step = e.step(), error = %e, "pull request pipeline failed"));
            return Err(e.into());
        }
        Err(_) => {
            span.in_scope(|| error!(timeout = ?state.pipeline_timeout(), "pull request pipeline timed out"));
            return Err(AppError::Timeout(state.pipeline_timeout()));
        }
    };

    span.in_scope(|| info!(number = pr.number, "push handled"));
    Ok(Json(json!({
        "status": "pr_created",
        "number": pr.number,
        "url": pr.html_url,
    })))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn ignored(reason: &str) -> Json<Value> {
    Json(json!({ "status": "ignored", "reason": reason }))
}

/// JSON bodies carry a push event; anything else is the legacy text form
/// whose first line is a commit SHA.
fn decode_push(headers: &HeaderMap, body: &[u8]) -> Result<GitHubPushEvent, AppError> {
    let is_json = header_str(headers, header::CONTENT_TYPE.as_str())
        .is_some_and(|ct| ct.trim_start().starts_with("application/json"));

    if is_json {
        return serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("invalid push payload: {e}")));
    }

    let text = std::str::from_utf8(body)
        .map_err(|_| AppError::BadRequest("push body is not valid UTF-8".to_string()))?;
    GitHubPushEvent::from_text(text)
        .ok_or_else(|| AppError::BadRequest("push body is empty, expected a commit SHA".to_string()))
}
