//! The reduction engine.
//!
//! Owns the dispatcher and a pool of worker tasks draining the shared
//! event queue. Start/stop follows the usual service lifecycle: an
//! atomic running flag plus a broadcast shutdown channel.

mod config;
mod runner;
mod types;

pub use config::EngineConfig;
pub use runner::ReductionEngine;
pub use types::{EngineError, EngineStatus};
