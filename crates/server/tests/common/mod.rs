//! Common test utilities for in-process API testing.
//!
//! Builds the full router over a temp database with a mock stacking
//! backend injected, so endpoint behavior is testable without binding
//! a socket or spawning the binary.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use vela_core::testing::MockStacker;
use vela_core::{
    create_audit_system, default_graph, standard_registry, AuditStore, Config, DatabaseConfig,
    EngineConfig, EventQueue, InstrumentConfig, Ledger, ReductionEngine, RunContext,
    ServerConfig, SqliteAuditStore, SqliteLedger, Stacker,
};
use vela_server::api::create_router;
use vela_server::state::AppState;

/// In-process server fixture with a controllable stacking backend.
pub struct TestFixture {
    pub router: Router,
    pub stacker: Arc<MockStacker>,
    pub ledger: Arc<SqliteLedger>,
    pub engine: Arc<ReductionEngine>,
    /// Holds the test database until the fixture drops.
    #[allow(dead_code)]
    pub temp_dir: TempDir,
}

/// Response from an in-process request.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Knobs for fixture construction.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub instrument: InstrumentConfig,
    pub start_engine: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            instrument: InstrumentConfig::default(),
            start_engine: false,
        }
    }
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut instrument = test_config.instrument;
        instrument.output_dir = temp_dir.path().join("redux");

        let config = Config {
            instrument: instrument.clone(),
            server: ServerConfig::default(),
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            engine: EngineConfig {
                enabled: test_config.start_engine,
                workers: 2,
                poll_interval_ms: 10,
            },
        };

        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        );
        let ledger = Arc::new(SqliteLedger::new(&db_path).expect("Failed to create ledger"));

        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let stacker = Arc::new(MockStacker::new());
        let registry = Arc::new(standard_registry(
            Arc::clone(&stacker) as Arc<dyn Stacker>
        ));
        let ctx = RunContext {
            instrument: Arc::new(instrument),
            ledger: Arc::clone(&ledger) as Arc<dyn Ledger>,
            audit: Some(audit_handle.clone()),
            events: EventQueue::new(),
        };
        let engine = Arc::new(
            ReductionEngine::new(config.engine.clone(), Arc::new(default_graph()), registry, ctx)
                .expect("Failed to create engine"),
        );
        if test_config.start_engine {
            engine.start().await;
        }

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&engine),
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            audit_store,
            audit_handle,
        ));
        let router = create_router(state);

        Self {
            router,
            stacker,
            ledger,
            engine,
            temp_dir,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
