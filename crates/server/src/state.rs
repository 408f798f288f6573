use std::sync::Arc;

use vela_core::audit::{AuditHandle, AuditStore};
use vela_core::{Config, Ledger, ReductionEngine, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    engine: Arc<ReductionEngine>,
    ledger: Arc<dyn Ledger>,
    audit_store: Arc<dyn AuditStore>,
    audit_handle: AuditHandle,
}

impl AppState {
    pub fn new(
        config: Config,
        engine: Arc<ReductionEngine>,
        ledger: Arc<dyn Ledger>,
        audit_store: Arc<dyn AuditStore>,
        audit_handle: AuditHandle,
    ) -> Self {
        Self {
            config,
            engine,
            ledger,
            audit_store,
            audit_handle,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn engine(&self) -> &ReductionEngine {
        self.engine.as_ref()
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    pub fn audit_handle(&self) -> &AuditHandle {
        &self.audit_handle
    }
}
