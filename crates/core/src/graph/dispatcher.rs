//! The dispatch loop.

use std::sync::Arc;

use tracing::{info, warn};

use super::{EventGraph, EventQueue, GraphError};
use crate::audit::AuditEvent;
use crate::exposure::Payload;
use crate::metrics;
use crate::primitives::{PrimitiveRegistry, RunContext};

/// Pulls pending events off the shared queue, runs the bound work and
/// emits the declared successor. A failed step halts its own exposure's
/// chain and nothing else; the dispatcher never crashes for a single
/// exposure's failure.
///
/// Multiple dispatchers may drain the same queue concurrently. A single
/// exposure's chain stays strictly ordered regardless: its successor is
/// only enqueued after the predecessor step returns.
pub struct Dispatcher {
    graph: Arc<EventGraph>,
    registry: Arc<PrimitiveRegistry>,
    queue: EventQueue,
    ctx: RunContext,
}

impl Dispatcher {
    /// Build a dispatcher over a validated graph. Fails when the graph
    /// is structurally unsound or binds work no primitive provides.
    pub fn new(
        graph: Arc<EventGraph>,
        registry: Arc<PrimitiveRegistry>,
        ctx: RunContext,
    ) -> Result<Self, GraphError> {
        graph.validate()?;
        graph.validate_work(&registry.names())?;
        let queue = ctx.events.clone();
        Ok(Self {
            graph,
            registry,
            queue,
            ctx,
        })
    }

    /// Enqueue a pending invocation.
    pub fn emit(&self, event: &str, payload: Payload) {
        self.queue.push(event, payload);
    }

    /// Number of pending invocations.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Dispatch the oldest pending invocation. Returns false when the
    /// queue was empty, true when an event was consumed (whether its
    /// step succeeded or not).
    pub async fn step_once(&self) -> bool {
        let Some(queued) = self.queue.pop() else {
            return false;
        };

        let exposure_id = queued.payload.exposure.id.clone();

        let Some(step) = self.graph.get(&queued.event) else {
            // Cannot happen for events emitted through a validated
            // graph, but a primitive may re-emit a bad name.
            warn!(event = %queued.event, exposure = %exposure_id, "undeclared event, dropping");
            metrics::STEPS_FAILED.with_label_values(&[&queued.event]).inc();
            return true;
        };

        let Some(primitive) = self.registry.get(&step.work) else {
            warn!(work = %step.work, event = %queued.event, "no primitive bound, dropping");
            metrics::STEPS_FAILED.with_label_values(&[&queued.event]).inc();
            return true;
        };

        info!(exposure = %exposure_id, event = %queued.event, "{}", step.started_notice);

        match primitive.apply(queued.payload, &self.ctx).await {
            Ok(payload) => {
                metrics::STEPS_COMPLETED
                    .with_label_values(&[&queued.event])
                    .inc();
                if let Some(audit) = &self.ctx.audit {
                    audit
                        .emit(AuditEvent::StepCompleted {
                            exposure_id: exposure_id.clone(),
                            step: queued.event.clone(),
                        })
                        .await;
                }
                if let Some(next) = &step.next {
                    self.emit(next, payload);
                }
            }
            Err(e) => {
                warn!(
                    exposure = %exposure_id,
                    event = %queued.event,
                    error = %e,
                    "step failed, halting this exposure's chain"
                );
                metrics::STEPS_FAILED
                    .with_label_values(&[&queued.event])
                    .inc();
                if let Some(audit) = &self.ctx.audit {
                    audit
                        .emit(AuditEvent::StepFailed {
                            exposure_id,
                            step: queued.event.clone(),
                            error: e.to_string(),
                        })
                        .await;
                }
            }
        }

        true
    }

    /// Dispatch until the queue drains. Chains emit their successors
    /// synchronously from `step_once`, so an empty queue means every
    /// in-flight path has reached a terminal step or failed.
    pub async fn run_until_idle(&self) {
        while self.step_once().await {}
    }
}
