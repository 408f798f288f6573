//! Exposure ingestion API handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vela_core::ledger::{EntryKind, LedgerEntry, LedgerFilter};
use vela_core::{Exposure, FrameType};

use crate::state::AppState;

/// Maximum allowed limit for exposure listings
const MAX_LIMIT: i64 = 1000;

/// Default limit for exposure listings
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting an exposure. Mirrors the header fields the
/// file watcher extracts from a new frame on disk.
#[derive(Debug, Deserialize)]
pub struct IngestExposureBody {
    /// Frame filename, unique per exposure
    pub id: String,
    /// IMTYPE header value (BIAS, DARK, OBJECT, ...)
    pub frame_type: Option<String>,
    /// Calibration group identifier
    pub group_id: String,
    /// Exposure duration in seconds
    #[serde(default)]
    pub exposure_time_secs: f64,
    /// Instrument configuration identifier
    #[serde(default)]
    pub config_id: String,
    /// Camera name
    #[serde(default)]
    pub camera: String,
    /// Nod-and-shuffle mask in the beam
    #[serde(default)]
    pub nod_shuffle_mask: bool,
    /// Number of open shutter positions
    pub open_shutters: Option<u32>,
}

/// Response after queueing an exposure
#[derive(Debug, Serialize)]
pub struct IngestExposureResponse {
    pub id: String,
    pub status: String,
}

/// Query parameters for listing recorded exposures
#[derive(Debug, Deserialize)]
pub struct ListExposuresParams {
    /// Filter by frame type tag (BIAS, MBIAS, ...)
    pub frame_type: Option<String>,
    /// Filter by calibration group
    pub group_id: Option<String>,
    /// Maximum number of entries to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Response for listing recorded exposures
#[derive(Debug, Serialize)]
pub struct ListExposuresResponse {
    pub entries: Vec<LedgerEntry>,
    pub limit: i64,
    pub offset: i64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ExposureErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Queue an exposure for reduction. The engine classifies and routes it
/// asynchronously; rejection shows up in the audit trail, not here.
pub async fn ingest_exposure(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IngestExposureBody>,
) -> Result<(StatusCode, Json<IngestExposureResponse>), (StatusCode, Json<ExposureErrorResponse>)>
{
    if body.id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ExposureErrorResponse {
                error: "id must not be empty".to_string(),
            }),
        ));
    }
    if body.group_id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ExposureErrorResponse {
                error: "group_id must not be empty".to_string(),
            }),
        ));
    }

    // An unrecognized IMTYPE is still accepted; the classifier rejects it
    // with an audit record rather than dropping it silently here.
    let frame_type = body.frame_type.as_deref().and_then(FrameType::from_tag);

    let exposure = Exposure::new(body.id.clone(), frame_type, body.group_id)
        .with_exposure_time(body.exposure_time_secs)
        .with_config_id(body.config_id)
        .with_camera(body.camera)
        .with_shutter_mode(body.nod_shuffle_mask, body.open_shutters.unwrap_or(1));

    state.engine().ingest(exposure);

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestExposureResponse {
            id: body.id,
            status: "queued".to_string(),
        }),
    ))
}

/// List recorded raw exposures
pub async fn list_exposures(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListExposuresParams>,
) -> Result<Json<ListExposuresResponse>, (StatusCode, Json<ExposureErrorResponse>)> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = LedgerFilter::new()
        .with_kind(EntryKind::Raw)
        .with_limit(limit)
        .with_offset(offset);

    if let Some(ref tag) = params.frame_type {
        match FrameType::from_tag(tag) {
            Some(frame_type) => filter = filter.with_frame_type(frame_type),
            None => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(ExposureErrorResponse {
                        error: format!("unknown frame type: {}", tag),
                    }),
                ));
            }
        }
    }

    if let Some(ref group_id) = params.group_id {
        filter = filter.with_group(group_id);
    }

    match state.ledger().list(&filter) {
        Ok(entries) => Ok(Json(ListExposuresResponse {
            entries,
            limit,
            offset,
        })),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ExposureErrorResponse {
                error: format!("Failed to list exposures: {}", e),
            }),
        )),
    }
}
