//! Frame ingestion.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::{Primitive, PrimitiveError, RunContext};
use crate::audit::AuditEvent;
use crate::exposure::{Exposure, Payload};
use crate::ledger::NewFrameRecord;
use crate::metrics;

/// Records a freshly observed frame in the ledger and flags the payload
/// when the frame was already known. Frames violating a type policy
/// (a bias with nonzero duration) are recorded as unusable so they never
/// count toward readiness, and the ingestion itself still succeeds.
pub struct IngestFrame;

fn checksum(exposure: &Exposure) -> String {
    let mut hasher = Sha256::new();
    hasher.update(exposure.id.as_bytes());
    hasher.update(exposure.group_id.as_bytes());
    hasher.update(exposure.exposure_time_secs.to_le_bytes());
    hasher.update(exposure.config_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl Primitive for IngestFrame {
    fn name(&self) -> &str {
        "ingest_frame"
    }

    async fn apply(&self, payload: Payload, ctx: &RunContext) -> Result<Payload, PrimitiveError> {
        let mut payload = payload;
        let exposure = &mut payload.exposure;

        exposure.in_ledger = ctx.ledger.contains_frame(&exposure.id)?;

        let usable = exposure.satisfies_type_policy();
        if !usable {
            warn!(exposure = %exposure.id, "frame violates type policy, excluded from readiness counts");
            exposure.flag("type_policy_violation");
        }

        // Raw frames land in the ledger once; re-ingestions only set the
        // in_ledger flag and let the planner decide what to do.
        if !exposure.in_ledger {
            if let Some(frame_type) = exposure.frame_type.filter(|ft| ft.is_raw()) {
                ctx.ledger.record_frame(NewFrameRecord {
                    frame_id: exposure.id.clone(),
                    frame_type,
                    group_id: exposure.group_id.clone(),
                    checksum: checksum(exposure),
                    usable,
                })?;
            }
        }

        info!(
            exposure = %exposure.id,
            frame_type = exposure.frame_type.map(|ft| ft.tag()).unwrap_or("?"),
            group = %exposure.group_id,
            sequence = exposure.sequence_number(),
            in_ledger = exposure.in_ledger,
            "ingested frame"
        );

        metrics::EXPOSURES_INGESTED
            .with_label_values(&[exposure.frame_type.map(|ft| ft.tag()).unwrap_or("unknown")])
            .inc();

        if let Some(audit) = &ctx.audit {
            audit
                .emit(AuditEvent::ExposureIngested {
                    exposure_id: exposure.id.clone(),
                    frame_type: exposure.frame_type,
                    group_id: exposure.group_id.clone(),
                    usable,
                })
                .await;
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::InstrumentConfig;
    use crate::exposure::FrameType;
    use crate::graph::EventQueue;
    use crate::ledger::{Ledger, SqliteLedger};

    fn test_ctx() -> RunContext {
        RunContext {
            instrument: Arc::new(InstrumentConfig::default()),
            ledger: Arc::new(SqliteLedger::in_memory().unwrap()),
            audit: None,
            events: EventQueue::new(),
        }
    }

    #[tokio::test]
    async fn test_first_ingestion_records_frame() {
        let ctx = test_ctx();
        let exp = Exposure::new("b1.fits", Some(FrameType::Bias), "G1");

        let out = IngestFrame.apply(Payload::new(exp), &ctx).await.unwrap();

        assert!(!out.exposure.in_ledger);
        assert!(ctx.ledger.contains_frame("b1.fits").unwrap());
        assert_eq!(ctx.ledger.count(FrameType::Bias, "G1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reingestion_sets_flag_without_duplicate() {
        let ctx = test_ctx();
        let exp = Exposure::new("b1.fits", Some(FrameType::Bias), "G1");

        IngestFrame
            .apply(Payload::new(exp.clone()), &ctx)
            .await
            .unwrap();
        let out = IngestFrame.apply(Payload::new(exp), &ctx).await.unwrap();

        assert!(out.exposure.in_ledger);
        assert_eq!(ctx.ledger.count(FrameType::Bias, "G1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bad_bias_recorded_unusable() {
        let ctx = test_ctx();
        let exp = Exposure::new("b1.fits", Some(FrameType::Bias), "G1").with_exposure_time(2.0);

        let out = IngestFrame.apply(Payload::new(exp), &ctx).await.unwrap();

        assert!(out
            .exposure
            .quality_flags
            .contains(&"type_policy_violation".to_string()));
        // Known, but not counted
        assert!(ctx.ledger.contains_frame("b1.fits").unwrap());
        assert_eq!(ctx.ledger.count(FrameType::Bias, "G1").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_type_not_recorded() {
        let ctx = test_ctx();
        let exp = Exposure::new("x1.fits", None, "G1");

        IngestFrame.apply(Payload::new(exp), &ctx).await.unwrap();
        assert!(!ctx.ledger.contains_frame("x1.fits").unwrap());
    }
}
