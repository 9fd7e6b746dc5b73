//! API Module
//!
//! HTTP API layer for the agent.
//! Each submodule handles endpoints for a specific concern.

pub mod auth;
pub mod error;
pub mod health;
pub mod job;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use secrecy::SecretString;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::{CallbackNotifier, JobExecutor};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<dyn JobExecutor>,
    pub notifier: CallbackNotifier,
    pub api_key: Arc<SecretString>,
}

impl AppState {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        notifier: CallbackNotifier,
        api_key: SecretString,
    ) -> Self {
        Self {
            executor,
            notifier,
            api_key: Arc::new(api_key),
        }
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/jobs/execute", post(job::execute_job))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/", get(health::service_info))
        .route("/health", get(health::health_check))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
