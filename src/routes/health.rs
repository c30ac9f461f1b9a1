use axum::Json;
use serde_json::{json, Value};

/// Liveness probe. Always 200, independent of rate limiting and configuration.
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
