//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Ingestion and classification (ingested, rejected, skipped)
//! - Dispatch (steps completed/failed, queue depth)
//! - Stacking (masters built, builds skipped, build duration)

use once_cell::sync::Lazy;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
};

/// Exposures ingested, by frame type tag.
pub static EXPOSURES_INGESTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vela_exposures_ingested_total", "Total exposures ingested"),
        &["frame_type"],
    )
    .unwrap()
});

/// Exposures rejected by the classifier.
pub static EXPOSURES_REJECTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vela_exposures_rejected_total",
        "Total exposures rejected during classification",
    )
    .unwrap()
});

/// Exposures routed to the no-op path (already processed).
pub static EXPOSURES_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vela_exposures_skipped_total",
        "Total exposures skipped as already processed",
    )
    .unwrap()
});

/// Graph steps completed, by event name.
pub static STEPS_COMPLETED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vela_steps_completed_total", "Total graph steps completed"),
        &["event"],
    )
    .unwrap()
});

/// Graph steps failed, by event name.
pub static STEPS_FAILED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vela_steps_failed_total", "Total graph steps failed"),
        &["event"],
    )
    .unwrap()
});

/// Master products built, by frame type tag.
pub static MASTERS_BUILT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vela_masters_built_total", "Total master products built"),
        &["frame_type"],
    )
    .unwrap()
});

/// Builds skipped because a product exists or a claim was lost.
pub static BUILDS_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vela_builds_skipped_total",
        "Total master builds skipped for idempotency",
    )
    .unwrap()
});

/// Pending invocations in the event queue.
pub static EVENT_QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("vela_event_queue_depth", "Pending events awaiting dispatch").unwrap()
});

/// Master build duration in seconds, by frame type tag.
pub static BUILD_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vela_build_duration_seconds",
            "Duration of master product builds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["frame_type"],
    )
    .unwrap()
});

/// All core metrics, for registration in a server-side registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(EXPOSURES_INGESTED.clone()),
        Box::new(EXPOSURES_REJECTED.clone()),
        Box::new(EXPOSURES_SKIPPED.clone()),
        Box::new(STEPS_COMPLETED.clone()),
        Box::new(STEPS_FAILED.clone()),
        Box::new(MASTERS_BUILT.clone()),
        Box::new(BUILDS_SKIPPED.clone()),
        Box::new(EVENT_QUEUE_DEPTH.clone()),
        Box::new(BUILD_DURATION.clone()),
    ]
}
