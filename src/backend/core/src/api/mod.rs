//! HTTP surface for the job subsystem.
//!
//! This module exposes a mountable `axum::Router`; the host application
//! nests it under its own path prefix and auth middleware and owns the
//! listener. Routes:
//!
//! - `POST   /jobs/{type}` - submit a job
//! - `GET    /jobs/{type}/{jobId}` - job status
//! - `DELETE /jobs/{type}/{jobId}` - cancel a job
//! - `GET    /jobs/queues/stats` - stats for all queues
//! - `GET    /jobs/queues/{type}/stats` - stats for one queue
//! - `POST   /jobs/queues/{type}/pause` - pause dispatch
//! - `POST   /jobs/queues/{type}/resume` - resume dispatch
//! - `POST   /jobs/queues/{type}/clean` - remove old terminal records

mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::jobs::QueueRegistry;

/// State shared across job API handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: QueueRegistry,
}

/// Build the job API router.
pub fn job_routes(registry: QueueRegistry) -> Router {
    let state = AppState { registry };

    Router::new()
        .route("/jobs/queues/stats", get(handlers::all_queue_stats))
        .route("/jobs/queues/:job_type/stats", get(handlers::queue_stats))
        .route("/jobs/queues/:job_type/pause", post(handlers::pause_queue))
        .route("/jobs/queues/:job_type/resume", post(handlers::resume_queue))
        .route("/jobs/queues/:job_type/clean", post(handlers::clean_queue))
        .route("/jobs/:job_type", post(handlers::submit_job))
        .route(
            "/jobs/:job_type/:job_id",
            get(handlers::get_job).delete(handlers::cancel_job),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
