pub mod audit;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod exposure;
pub mod gate;
pub mod graph;
pub mod ledger;
pub mod metrics;
pub mod primitives;
pub mod testing;

pub use audit::{create_audit_system, AuditEvent, AuditHandle, AuditStore, SqliteAuditStore};
pub use classifier::{classify, RoutingDecision};
pub use config::{
    load_config, load_config_from_str, Config, ConfigError, DatabaseConfig, InstrumentConfig,
    SanitizedConfig, ServerConfig,
};
pub use engine::{EngineConfig, EngineError, EngineStatus, ReductionEngine};
pub use exposure::{Exposure, FrameType, Payload, StackPlan};
pub use graph::{default_graph, Dispatcher, EventGraph, EventQueue};
pub use ledger::{Ledger, LedgerEntry, LedgerFilter, SqliteLedger};
pub use primitives::{standard_registry, FsStacker, RunContext, Stacker};
