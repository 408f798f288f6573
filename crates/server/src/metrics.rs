//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the vela server:
//! - HTTP request metrics (latency, counts)
//! - Engine and ledger status (collected dynamically)
//!
//! Reduction metrics (ingestion, routing, builds) live in vela-core and
//! are registered here alongside the server's own.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use vela_core::ledger::{EntryKind, LedgerFilter};
use vela_core::FrameType;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vela_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vela_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "vela_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Engine Metrics (collected dynamically)
// =============================================================================

/// Engine running state (1 = running, 0 = stopped).
pub static ENGINE_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "vela_engine_running",
        "Whether the reduction engine is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Engine worker count.
pub static ENGINE_WORKERS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("vela_engine_workers", "Number of configured engine workers").unwrap()
});

// =============================================================================
// Ledger Metrics (collected dynamically)
// =============================================================================

/// Live ledger entries by kind.
pub static LEDGER_ENTRIES: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("vela_ledger_entries", "Live ledger entries by kind"),
        &["kind"],
    )
    .unwrap()
});

/// Live master products by frame type.
pub static LEDGER_MASTERS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "vela_ledger_masters",
            "Live master products by frame type",
        ),
        &["frame_type"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Engine
    registry.register(Box::new(ENGINE_RUNNING.clone())).unwrap();
    registry.register(Box::new(ENGINE_WORKERS.clone())).unwrap();

    // Ledger
    registry.register(Box::new(LEDGER_ENTRIES.clone())).unwrap();
    registry.register(Box::new(LEDGER_MASTERS.clone())).unwrap();

    // Core metrics (ingestion, routing, stacking)
    for metric in vela_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding metrics to update gauges with current values
/// from the engine and ledger.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.engine().status();
    ENGINE_RUNNING.set(if status.running { 1 } else { 0 });
    ENGINE_WORKERS.set(i64::from(status.workers));

    for kind in [EntryKind::Raw, EntryKind::Product] {
        let filter = LedgerFilter::new().with_kind(kind).with_limit(i64::MAX);
        if let Ok(entries) = state.ledger().list(&filter) {
            LEDGER_ENTRIES
                .with_label_values(&[kind.as_str()])
                .set(entries.len() as i64);
        }
    }

    for frame_type in [
        FrameType::MasterBias,
        FrameType::MasterDark,
        FrameType::MasterFlat,
        FrameType::MasterDome,
        FrameType::MasterTwiFlat,
    ] {
        let filter = LedgerFilter::new()
            .with_frame_type(frame_type)
            .with_kind(EntryKind::Product)
            .with_limit(i64::MAX);
        if let Ok(entries) = state.ledger().list(&filter) {
            LEDGER_MASTERS
                .with_label_values(&[frame_type.tag()])
                .set(entries.len() as i64);
        }
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    // Replace frame filenames and bare numbers with placeholders
    let frame_regex = regex_lite::Regex::new(r"/[\w.+-]+\.(fits|fit)(/|$)").unwrap();
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();

    let result = frame_regex.replace_all(path, "/{frame}$2");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    result.to_string()
}
