use axum::{extract::State, Json};
use oneclick_scheduler::Clock;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness check plus worker pool occupancy.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.scheduler.stats();
    Json(json!({
        "status": "healthy",
        "timestamp": state.scheduler.clock().now(),
        "version": env!("CARGO_PKG_VERSION"),
        "queued": stats.queued,
        "in_flight": stats.in_flight,
        "max_concurrency": stats.max_concurrency,
        "max_retries": state.config.scheduler.max_retries,
    }))
}
