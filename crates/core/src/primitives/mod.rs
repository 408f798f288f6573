//! Units of work bound to graph steps.
//!
//! Each primitive receives the current payload and the shared run
//! context, returns the (possibly mutated) payload on success or signals
//! failure. A primitive may block or run internal parallelism; the
//! dispatcher treats it as opaque and neither times out nor cancels it.

mod ingest;
mod planner;
mod stack;
mod steps;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use ingest::IngestFrame;
pub use planner::ActionPlanner;
pub use stack::{FsStacker, StackCalibration, StackError, StackJob, StackOutcome, Stacker};
pub use steps::{MakeSky, MarkStep, Noop};

use crate::audit::AuditHandle;
use crate::config::InstrumentConfig;
use crate::exposure::Payload;
use crate::graph::EventQueue;
use crate::ledger::{Ledger, LedgerError};

/// Error type for primitive execution.
#[derive(Debug, Error)]
pub enum PrimitiveError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("stacker error: {0}")]
    Stack(#[from] StackError),

    #[error("payload carries no stacking parameters")]
    MissingPlan,

    #[error("{0}")]
    Failed(String),
}

/// Shared run context threaded through every dispatch call. Cheap to
/// clone; concurrent per-exposure paths see the same ledger and queue
/// but carry no ambient global state.
#[derive(Clone)]
pub struct RunContext {
    pub instrument: Arc<InstrumentConfig>,
    pub ledger: Arc<dyn Ledger>,
    pub audit: Option<AuditHandle>,
    pub events: EventQueue,
}

/// One unit of work.
#[async_trait]
pub trait Primitive: Send + Sync {
    /// Name graph steps bind to.
    fn name(&self) -> &str;

    /// Run the work against the payload.
    async fn apply(&self, payload: Payload, ctx: &RunContext) -> Result<Payload, PrimitiveError>;
}

/// Name → primitive lookup used by the dispatcher.
#[derive(Default)]
pub struct PrimitiveRegistry {
    map: HashMap<String, Arc<dyn Primitive>>,
}

impl PrimitiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, primitive: Arc<dyn Primitive>) {
        self.map.insert(primitive.name().to_string(), primitive);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Primitive>> {
        self.map.get(name).cloned()
    }

    pub fn names(&self) -> HashSet<String> {
        self.map.keys().cloned().collect()
    }
}

/// The full primitive set for the standard reduction graph.
///
/// Numeric steps of the object and calibration chains are pure
/// bookkeeping here: they stamp the processing history and move on. The
/// pixel work lives behind the [`Stacker`] seam and whatever external
/// collaborator the deployment wires in.
pub fn standard_registry(stacker: Arc<dyn Stacker>) -> PrimitiveRegistry {
    let mut registry = PrimitiveRegistry::new();

    registry.register(Arc::new(Noop));
    registry.register(Arc::new(IngestFrame));
    registry.register(Arc::new(ActionPlanner));
    registry.register(Arc::new(StackCalibration::new(stacker)));
    registry.register(Arc::new(MakeSky));

    for step in [
        "trace_bars",
        "arc_solve",
        "correct_illumination",
        "subtract_nod_shuffle",
        "subtract_sine",
        "subtract_bias",
        "subtract_overscan",
        "trim_overscan",
        "correct_gain",
        "correct_defects",
        "remove_crs",
        "create_unc",
        "rectify_image",
        "subtract_dark",
        "subtract_scattered_light",
        "subtract_sky",
        "make_cube",
        "correct_wavelengths",
        "correct_dar",
        "make_invsens",
        "flux_calibrate",
    ] {
        registry.register(Arc::new(MarkStep::new(step)));
    }

    registry
}
