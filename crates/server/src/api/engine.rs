//! Reduction engine API handlers.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

/// Engine status response
#[derive(Debug, Serialize)]
pub struct EngineStatusResponse {
    /// Whether the engine workers are running
    pub running: bool,
    /// Events waiting in the dispatch queue
    pub pending_events: usize,
    /// Number of configured workers
    pub workers: u32,
    /// Raw frames recorded in the ledger
    pub ingested_total: i64,
    /// Master products currently live
    pub masters_built: i64,
}

/// Simple message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get engine status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<EngineStatusResponse> {
    let status = state.engine().status();
    Json(EngineStatusResponse {
        running: status.running,
        pending_events: status.pending_events,
        workers: status.workers,
        ingested_total: status.ingested_total,
        masters_built: status.masters_built,
    })
}

/// Start the engine workers
pub async fn start(State(state): State<Arc<AppState>>) -> Json<MessageResponse> {
    state.engine().start().await;
    Json(MessageResponse {
        message: "Engine started".to_string(),
    })
}

/// Stop the engine workers
pub async fn stop(State(state): State<Arc<AppState>>) -> Json<MessageResponse> {
    state.engine().stop().await;
    Json(MessageResponse {
        message: "Engine stopped".to_string(),
    })
}
