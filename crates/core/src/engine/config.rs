//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the reduction engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Enable/disable the engine workers.
    /// When disabled, ingested exposures queue up until a manual start.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Number of worker tasks draining the event queue.
    /// Distinct exposures proceed in parallel; each exposure's own
    /// chain stays strictly ordered.
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// How often an idle worker re-checks the queue (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_workers() -> u32 {
    2
}

fn default_poll_interval() -> u64 {
    250
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            workers: default_workers(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}
