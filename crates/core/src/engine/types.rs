//! Types for the reduction engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while assembling or driving the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The event graph failed validation.
    #[error("graph error: {0}")]
    Graph(#[from] crate::graph::GraphError),

    /// Ledger error.
    #[error("ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),
}

/// Current status of the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Whether the workers are running.
    pub running: bool,
    /// Pending invocations awaiting dispatch.
    pub pending_events: usize,
    /// Configured worker count.
    pub workers: u32,
    /// Raw frames recorded in the ledger.
    pub ingested_total: i64,
    /// Master products currently live in the ledger.
    pub masters_built: i64,
}
