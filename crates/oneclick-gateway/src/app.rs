use axum::{
    routing::{get, post},
    Router,
};
use oneclick_core::config::OneclickConfig;
use oneclick_scheduler::Scheduler;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::http::{health, schedule};

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: OneclickConfig,
    /// Owns the job store and the worker pool; handlers reach the store
    /// through it so both sides share one connection.
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(config: OneclickConfig, scheduler: Arc<Scheduler>) -> Self {
        Self { config, scheduler }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/schedule",
            post(schedule::create_schedule).get(schedule::list_schedules),
        )
        .route(
            "/api/schedule/{id}",
            get(schedule::get_schedule).delete(schedule::cancel_schedule),
        )
        .route("/api/schedule/{id}/execute", post(schedule::execute_schedule))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
