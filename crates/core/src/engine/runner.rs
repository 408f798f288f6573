//! Reduction engine implementation.
//!
//! Workers drain the shared event queue concurrently. Distinct
//! exposures run in parallel; a single exposure's chain stays ordered
//! because each successor is only enqueued after its predecessor step
//! returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use super::config::EngineConfig;
use super::types::{EngineError, EngineStatus};
use crate::exposure::{Exposure, FrameType, Payload};
use crate::graph::{Dispatcher, EventGraph};
use crate::ledger::{EntryKind, Ledger, LedgerFilter};
use crate::primitives::{PrimitiveRegistry, RunContext};

/// The reduction engine - routes ingested exposures through the event
/// graph until every path terminates.
pub struct ReductionEngine {
    config: EngineConfig,
    dispatcher: Arc<Dispatcher>,
    ledger: Arc<dyn Ledger>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ReductionEngine {
    /// Create a new engine over a validated graph.
    pub fn new(
        config: EngineConfig,
        graph: Arc<EventGraph>,
        registry: Arc<PrimitiveRegistry>,
        ctx: RunContext,
    ) -> Result<Self, EngineError> {
        let ledger = Arc::clone(&ctx.ledger);
        let dispatcher = Arc::new(Dispatcher::new(graph, registry, ctx)?);
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            dispatcher,
            ledger,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        })
    }

    /// Queue an exposure for processing. The workers pick it up from
    /// the ingestion event onward.
    pub fn ingest(&self, exposure: Exposure) {
        self.dispatcher.emit("next_file", Payload::new(exposure));
    }

    /// Start the engine (spawns worker tasks).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Engine already running");
            return;
        }

        info!(workers = self.config.workers, "Starting reduction engine");

        for worker_id in 0..self.config.workers {
            self.spawn_worker(worker_id);
        }

        info!("Reduction engine started");
    }

    /// Stop the engine gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Engine not running");
            return;
        }

        info!("Stopping reduction engine");

        // Signal shutdown to all workers
        let _ = self.shutdown_tx.send(());

        // Give workers a moment to finish current work
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("Reduction engine stopped");
    }

    /// Get current engine status. Counts come from the ledger and are
    /// best-effort: a store error reports zero rather than failing the
    /// status call.
    pub fn status(&self) -> EngineStatus {
        let ingested_total = self
            .ledger
            .list(&LedgerFilter::new().with_kind(EntryKind::Raw).with_limit(i64::MAX))
            .map(|entries| entries.len() as i64)
            .unwrap_or(0);
        let masters_built = self
            .ledger
            .list(&LedgerFilter::new().with_kind(EntryKind::Product).with_limit(i64::MAX))
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.frame_type != FrameType::Sky)
                    .count() as i64
            })
            .unwrap_or(0);

        EngineStatus {
            running: self.running.load(Ordering::Relaxed),
            pending_events: self.dispatcher.pending(),
            workers: self.config.workers,
            ingested_total,
            masters_built,
        }
    }

    /// Drive the queue to empty on the caller's task. Useful in tests
    /// and for batch reprocessing without starting workers.
    pub async fn drain(&self) {
        self.dispatcher.run_until_idle().await;
    }

    fn spawn_worker(&self, worker_id: u32) {
        let running = Arc::clone(&self.running);
        let dispatcher = Arc::clone(&self.dispatcher);
        let poll_interval = self.config.poll_interval_ms;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(worker_id, "Engine worker started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(worker_id, "Engine worker received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(poll_interval)) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        while dispatcher.step_once().await {
                            if !running.load(Ordering::Relaxed) {
                                break;
                            }
                        }
                    }
                }
            }
            info!(worker_id, "Engine worker stopped");
        });
    }
}
