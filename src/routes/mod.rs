pub mod config_handler;
pub mod health;
pub mod webhook_handler;

use axum::routing::{get, post};
use axum::{middleware, Router};
use std::sync::Arc;

use crate::app_state::AppState;
use crate::rate_limit::middleware::rate_limit;

use self::config_handler::config_handler;
use self::health::health_handler;
use self::webhook_handler::push_handler;

/// `/health` stays outside the rate limiter.
pub fn build_router(state: Arc<AppState>) -> Router {
    let limited = Router::new()
        .route("/config", post(config_handler))
        .route("/push", post(push_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(state.limiter()),
            rate_limit,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .merge(limited)
        .with_state(state)
}
