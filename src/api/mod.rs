//! HTTP surface over the routing and execution engine

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod session;
mod swap;
mod system;
mod transfer;

use crate::engine::session::ExecutionManager;
use crate::engine::EngineContext;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ExecutionManager>,
}

impl AppState {
    pub fn new(manager: Arc<ExecutionManager>) -> Self {
        Self { manager }
    }

    pub fn from_context(ctx: EngineContext) -> Self {
        Self::new(Arc::new(ExecutionManager::new(ctx)))
    }

    pub fn ctx(&self) -> &EngineContext {
        self.manager.context()
    }
}

/// Create the API router with all endpoints
pub fn router(state: AppState) -> Router {
    Router::new()
        // Reference data
        .route("/chains", get(system::list_chains))
        // Pure previews
        .route("/route", post(swap::classify_route))
        .route("/swap/commands", post(swap::preview_commands))
        .route("/transfer-spec", post(transfer::build_transfer))
        // Executions
        .route("/swap", post(swap::submit_swap))
        .route("/swaps", get(session::list_executions))
        .route("/swap/:id", get(session::get_execution))
        .route("/swap/:id/reset", post(session::reset_execution))
        .route("/swap/:id/retry", post(session::retry_execution))
        .with_state(state)
}

/// Full application: health check, `/api` routes, CORS and request tracing
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", router(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> &'static str {
    "ok"
}
