//! Provenance ledger API handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vela_core::ledger::{EntryKind, LedgerEntry, LedgerFilter};
use vela_core::FrameType;

use crate::state::AppState;

/// Maximum allowed limit for ledger queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for ledger queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for the ledger endpoint
#[derive(Debug, Deserialize)]
pub struct LedgerQueryParams {
    /// Filter by frame type tag (BIAS, MBIAS, ...)
    pub frame_type: Option<String>,
    /// Filter by calibration group
    pub group_id: Option<String>,
    /// Filter by entry kind (raw or product)
    pub kind: Option<String>,
    /// Include products replaced by a clobber rebuild
    #[serde(default)]
    pub include_superseded: bool,
    /// Maximum number of entries to return (default 100, max 1000)
    pub limit: Option<i64>,
    /// Pagination offset (default 0)
    pub offset: Option<i64>,
}

/// Response for ledger queries
#[derive(Debug, Serialize)]
pub struct LedgerQueryResponse {
    pub entries: Vec<LedgerEntry>,
    pub limit: i64,
    pub offset: i64,
}

/// Error response for ledger queries
#[derive(Debug, Serialize)]
pub struct LedgerErrorResponse {
    pub error: String,
}

/// Query the provenance ledger
pub async fn query_ledger(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LedgerQueryParams>,
) -> Result<Json<LedgerQueryResponse>, (StatusCode, Json<LedgerErrorResponse>)> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = LedgerFilter::new().with_limit(limit).with_offset(offset);

    if params.include_superseded {
        filter = filter.include_superseded();
    }

    if let Some(ref tag) = params.frame_type {
        match FrameType::from_tag(tag) {
            Some(frame_type) => filter = filter.with_frame_type(frame_type),
            None => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(LedgerErrorResponse {
                        error: format!("unknown frame type: {}", tag),
                    }),
                ));
            }
        }
    }

    if let Some(ref group_id) = params.group_id {
        filter = filter.with_group(group_id);
    }

    if let Some(ref kind) = params.kind {
        match EntryKind::from_str(kind) {
            Some(kind) => filter = filter.with_kind(kind),
            None => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(LedgerErrorResponse {
                        error: format!("unknown entry kind: {}", kind),
                    }),
                ));
            }
        }
    }

    match state.ledger().list(&filter) {
        Ok(entries) => Ok(Json(LedgerQueryResponse {
            entries,
            limit,
            offset,
        })),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(LedgerErrorResponse {
                error: format!("Failed to query ledger: {}", e),
            }),
        )),
    }
}
