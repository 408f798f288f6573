use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{audit, engine, exposures, handlers, middleware::metrics_middleware, ledger};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Audit
        .route("/audit", get(audit::query_audit))
        // Exposures
        .route("/exposures", post(exposures::ingest_exposure))
        .route("/exposures", get(exposures::list_exposures))
        // Provenance ledger
        .route("/ledger", get(ledger::query_ledger))
        // Engine control
        .route("/engine/status", get(engine::get_status))
        .route("/engine/start", post(engine::start))
        .route("/engine/stop", post(engine::stop))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
