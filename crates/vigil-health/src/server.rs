//! The local liveness endpoint polled by peer watchdogs.

use axum::Router;
use axum::routing::get;

/// `GET /health` → `ok`. Pure liveness: if this answers, the process runs.
pub fn health_router() -> Router {
    Router::new().route("/health", get(health))
}

async fn health() -> &'static str {
    crate::checker::HEALTHY_BODY
}
