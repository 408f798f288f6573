//! Routing step between ingestion and the typed processing paths.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{Primitive, PrimitiveError, RunContext};
use crate::audit::AuditEvent;
use crate::classifier::{classify, RoutingDecision};
use crate::exposure::Payload;
use crate::metrics;

/// Runs the classifier against the ingested exposure and re-emits the
/// payload onto the chosen path. Terminal in the graph; continuation
/// happens through the queue, not through a declared successor.
pub struct ActionPlanner;

#[async_trait]
impl Primitive for ActionPlanner {
    fn name(&self) -> &str {
        "action_planner"
    }

    async fn apply(&self, payload: Payload, ctx: &RunContext) -> Result<Payload, PrimitiveError> {
        let mut payload = payload;
        let decision = classify(&payload.exposure, ctx.ledger.as_ref(), &ctx.instrument);

        match decision {
            RoutingDecision::Route { event, plan } => {
                info!(exposure = %payload.exposure.id, event = %event, "routing exposure");
                if let Some(audit) = &ctx.audit {
                    audit
                        .emit(AuditEvent::ExposureRouted {
                            exposure_id: payload.exposure.id.clone(),
                            group_id: payload.exposure.group_id.clone(),
                            event: event.clone(),
                        })
                        .await;
                }
                payload.plan = plan;
                ctx.events.push(event, payload.clone());
            }
            RoutingDecision::Skip => {
                info!(exposure = %payload.exposure.id, "already processed, skipping");
                metrics::EXPOSURES_SKIPPED.inc();
                if let Some(audit) = &ctx.audit {
                    audit
                        .emit(AuditEvent::ExposureSkipped {
                            exposure_id: payload.exposure.id.clone(),
                        })
                        .await;
                }
                ctx.events.push("noop", payload.clone());
            }
            RoutingDecision::Reject { reason } => {
                warn!(exposure = %payload.exposure.id, %reason, "rejecting exposure");
                metrics::EXPOSURES_REJECTED.inc();
                if let Some(audit) = &ctx.audit {
                    audit
                        .emit(AuditEvent::ExposureRejected {
                            exposure_id: payload.exposure.id.clone(),
                            reason,
                        })
                        .await;
                }
                // No event: the exposure's journey ends here.
            }
        }

        Ok(payload)
    }
}
