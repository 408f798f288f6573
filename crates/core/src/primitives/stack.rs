//! Master product building.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Primitive, PrimitiveError, RunContext};
use crate::audit::AuditEvent;
use crate::exposure::{sequence_from_filename, FrameType, Payload};
use crate::gate;
use crate::ledger::NewProductRecord;
use crate::metrics;

/// Error type for stacking backends.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("stack failed: {0}")]
    Failed(String),
}

/// One build request handed to the stacking backend.
#[derive(Debug, Clone, Serialize)]
pub struct StackJob {
    /// Unique job id.
    pub id: String,
    /// Calibration group being combined.
    pub group_id: String,
    /// Intermediate stacked type the path produces, when it has one.
    pub stack_type: Option<FrameType>,
    /// Master type the build produces.
    pub new_type: FrameType,
    /// Raw frames going into the combine.
    pub source_ids: Vec<String>,
    /// Destination filename.
    pub out_file_name: String,
    /// Destination directory.
    pub out_dir: PathBuf,
}

/// Result of a completed build.
#[derive(Debug, Clone)]
pub struct StackOutcome {
    /// SHA-256 of the written product.
    pub checksum: String,
}

/// The seam between the orchestration core and the numeric combine.
/// Implementations may block and run internal parallelism; that is
/// invisible to the dispatcher.
#[async_trait]
pub trait Stacker: Send + Sync {
    async fn stack(&self, job: &StackJob) -> Result<StackOutcome, StackError>;
}

/// Filesystem-backed stacker: writes the build manifest to the product
/// destination. The pixel combine itself belongs to an external
/// collaborator; what matters to the engine is that the product lands
/// at the declared path with a verifiable checksum.
pub struct FsStacker;

#[async_trait]
impl Stacker for FsStacker {
    async fn stack(&self, job: &StackJob) -> Result<StackOutcome, StackError> {
        let manifest =
            serde_json::to_vec_pretty(job).map_err(|e| StackError::Serialization(e.to_string()))?;

        tokio::fs::create_dir_all(&job.out_dir).await?;
        let dest = job.out_dir.join(&job.out_file_name);
        tokio::fs::write(&dest, &manifest).await?;

        let mut hasher = Sha256::new();
        hasher.update(&manifest);
        Ok(StackOutcome {
            checksum: format!("{:x}", hasher.finalize()),
        })
    }
}

/// Gate-then-build step terminating the calibration paths.
///
/// Recomputes readiness from the ledger on every invocation, so a group
/// may become ready after any single ingestion. The claim in the ledger
/// guarantees at-most-once building even when parallel workers cross
/// the threshold together.
pub struct StackCalibration {
    stacker: Arc<dyn Stacker>,
}

impl StackCalibration {
    pub fn new(stacker: Arc<dyn Stacker>) -> Self {
        Self { stacker }
    }
}

#[async_trait]
impl Primitive for StackCalibration {
    fn name(&self) -> &str {
        "stack_calibration"
    }

    async fn apply(&self, payload: Payload, ctx: &RunContext) -> Result<Payload, PrimitiveError> {
        let plan = payload.plan.as_ref().ok_or(PrimitiveError::MissingPlan)?;
        let group_id = &payload.exposure.group_id;
        let ledger = ctx.ledger.as_ref();

        if !gate::is_ready(ledger, group_id, plan.want_type, plan.min_frames)? {
            debug!(
                group = %group_id,
                want = %plan.want_type,
                min = plan.min_frames,
                "group not ready, waiting for more frames"
            );
            return Ok(payload);
        }

        let clobber = ctx.instrument.clobber;

        if gate::already_built(ledger, group_id, plan.new_type)? && !clobber {
            debug!(group = %group_id, master = %plan.new_type, "master already built");
            metrics::BUILDS_SKIPPED.inc();
            if let Some(audit) = &ctx.audit {
                audit
                    .emit(AuditEvent::BuildSkipped {
                        group_id: group_id.clone(),
                        frame_type: plan.new_type,
                        reason: "already built".to_string(),
                    })
                    .await;
            }
            return Ok(payload);
        }

        // Exactly one ready transition wins the claim; everyone else
        // backs off quietly.
        if !ledger.try_claim_build(group_id, plan.new_type, &plan.out_file_name, clobber)? {
            metrics::BUILDS_SKIPPED.inc();
            if let Some(audit) = &ctx.audit {
                audit
                    .emit(AuditEvent::BuildSkipped {
                        group_id: group_id.clone(),
                        frame_type: plan.new_type,
                        reason: "claim held elsewhere".to_string(),
                    })
                    .await;
            }
            return Ok(payload);
        }

        let mut sources: Vec<String> = ledger
            .search(plan.want_type, group_id)?
            .into_iter()
            .filter(|e| e.usable)
            .map(|e| e.frame_id)
            .collect();
        // Combine in acquisition order, not ledger insertion order.
        sources.sort_by_key(|id| (sequence_from_filename(id), id.clone()));

        if let Some(audit) = &ctx.audit {
            audit
                .emit(AuditEvent::StackReady {
                    group_id: group_id.clone(),
                    frame_type: plan.want_type,
                    count: sources.len() as i64,
                })
                .await;
        }

        let job = StackJob {
            id: Uuid::new_v4().to_string(),
            group_id: group_id.clone(),
            stack_type: plan.stack_type,
            new_type: plan.new_type,
            source_ids: sources.clone(),
            out_file_name: plan.out_file_name.clone(),
            out_dir: plan.out_dir.clone(),
        };

        let timer = metrics::BUILD_DURATION
            .with_label_values(&[plan.new_type.tag()])
            .start_timer();

        let outcome = match self.stacker.stack(&job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Free the claim so the next arrival can retry the build.
                ledger.release_claim(group_id, plan.new_type)?;
                timer.observe_duration();
                return Err(e.into());
            }
        };
        timer.observe_duration();

        ledger.record_product(NewProductRecord {
            frame_id: plan.out_file_name.clone(),
            frame_type: plan.new_type,
            group_id: group_id.clone(),
            source_ids: sources.clone(),
            checksum: outcome.checksum,
        })?;

        info!(
            group = %group_id,
            master = %plan.new_type,
            product = %plan.out_file_name,
            sources = sources.len(),
            "built master product"
        );
        metrics::MASTERS_BUILT
            .with_label_values(&[plan.new_type.tag()])
            .inc();

        if let Some(audit) = &ctx.audit {
            audit
                .emit(AuditEvent::MasterBuilt {
                    product_id: plan.out_file_name.clone(),
                    group_id: group_id.clone(),
                    frame_type: plan.new_type,
                    source_count: sources.len(),
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
    use crate::exposure::{Exposure, StackPlan};
    use crate::graph::EventQueue;
    use crate::ledger::{Ledger, NewFrameRecord, SqliteLedger};
    use crate::testing::MockStacker;

    fn ctx_with(ledger: Arc<SqliteLedger>, clobber: bool) -> RunContext {
        let mut instrument = InstrumentConfig::default();
        instrument.clobber = clobber;
        RunContext {
            instrument: Arc::new(instrument),
            ledger,
            audit: None,
            events: EventQueue::new(),
        }
    }

    fn flat_payload(group: &str, min_frames: u32) -> Payload {
        let exp = Exposure::new("f9.fits", Some(FrameType::FlatLamp), group)
            .with_exposure_time(10.0);
        Payload::new(exp).with_plan(StackPlan {
            want_type: FrameType::FlatLamp,
            stack_type: Some(FrameType::StackedFlat),
            new_type: FrameType::MasterFlat,
            min_frames,
            out_file_name: format!("master_flat_{}.fits", group),
            out_dir: PathBuf::from("redux"),
        })
    }

    fn record_flats(ledger: &SqliteLedger, group: &str, n: u32) {
        for seq in 1..=n {
            ledger
                .record_frame(NewFrameRecord {
                    frame_id: format!("f{}.fits", seq),
                    frame_type: FrameType::FlatLamp,
                    group_id: group.to_string(),
                    checksum: format!("sha-{}", seq),
                    usable: true,
                })
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_not_ready_does_not_build() {
        let ledger = Arc::new(SqliteLedger::in_memory().unwrap());
        record_flats(&ledger, "G1", 2);
        let stacker = Arc::new(MockStacker::new());
        let step = StackCalibration::new(stacker.clone());

        step.apply(flat_payload("G1", 3), &ctx_with(ledger, false))
            .await
            .unwrap();

        assert!(stacker.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_ready_builds_and_records_product() {
        let ledger = Arc::new(SqliteLedger::in_memory().unwrap());
        record_flats(&ledger, "G1", 3);
        let stacker = Arc::new(MockStacker::new());
        let step = StackCalibration::new(stacker.clone());

        step.apply(flat_payload("G1", 3), &ctx_with(ledger.clone(), false))
            .await
            .unwrap();

        let jobs = stacker.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].source_ids.len(), 3);
        assert_eq!(jobs[0].stack_type, Some(FrameType::StackedFlat));
        assert_eq!(jobs[0].new_type, FrameType::MasterFlat);
        assert!(ledger.exists(FrameType::MasterFlat, "G1").unwrap());
    }

    #[tokio::test]
    async fn test_sources_ordered_by_sequence() {
        let ledger = Arc::new(SqliteLedger::in_memory().unwrap());
        // Recorded out of acquisition order
        for seq in [3u32, 1, 2] {
            ledger
                .record_frame(NewFrameRecord {
                    frame_id: format!("kb230401_{:05}.fits", seq),
                    frame_type: FrameType::FlatLamp,
                    group_id: "G1".to_string(),
                    checksum: format!("sha-{}", seq),
                    usable: true,
                })
                .unwrap();
        }
        let stacker = Arc::new(MockStacker::new());

        StackCalibration::new(stacker.clone())
            .apply(flat_payload("G1", 3), &ctx_with(ledger, false))
            .await
            .unwrap();

        let jobs = stacker.jobs();
        assert_eq!(
            jobs[0].source_ids,
            vec![
                "kb230401_00001.fits",
                "kb230401_00002.fits",
                "kb230401_00003.fits"
            ]
        );
    }

    #[tokio::test]
    async fn test_existing_master_not_rebuilt() {
        let ledger = Arc::new(SqliteLedger::in_memory().unwrap());
        record_flats(&ledger, "G1", 3);
        let stacker = Arc::new(MockStacker::new());
        let step = StackCalibration::new(stacker.clone());
        let ctx = ctx_with(ledger, false);

        step.apply(flat_payload("G1", 3), &ctx).await.unwrap();
        // A 4th frame arriving must not duplicate the build
        step.apply(flat_payload("G1", 3), &ctx).await.unwrap();

        assert_eq!(stacker.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_clobber_rebuilds() {
        let ledger = Arc::new(SqliteLedger::in_memory().unwrap());
        record_flats(&ledger, "G1", 3);
        let stacker = Arc::new(MockStacker::new());
        let step = StackCalibration::new(stacker.clone());
        let ctx = ctx_with(ledger.clone(), true);

        step.apply(flat_payload("G1", 3), &ctx).await.unwrap();
        step.apply(flat_payload("G1", 3), &ctx).await.unwrap();

        assert_eq!(stacker.jobs().len(), 2);
        // Only one live master remains
        assert_eq!(ledger.search(FrameType::MasterFlat, "G1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_build_releases_claim() {
        let ledger = Arc::new(SqliteLedger::in_memory().unwrap());
        record_flats(&ledger, "G1", 3);
        let failing = Arc::new(MockStacker::failing());
        let ctx = ctx_with(ledger.clone(), false);

        let result = StackCalibration::new(failing)
            .apply(flat_payload("G1", 3), &ctx)
            .await;
        assert!(matches!(result, Err(PrimitiveError::Stack(_))));

        // A later arrival can retry
        let stacker = Arc::new(MockStacker::new());
        StackCalibration::new(stacker.clone())
            .apply(flat_payload("G1", 3), &ctx)
            .await
            .unwrap();
        assert_eq!(stacker.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_threshold_builds_immediately() {
        let ledger = Arc::new(SqliteLedger::in_memory().unwrap());
        record_flats(&ledger, "G1", 1);
        let stacker = Arc::new(MockStacker::new());

        StackCalibration::new(stacker.clone())
            .apply(flat_payload("G1", 0), &ctx_with(ledger, false))
            .await
            .unwrap();

        assert_eq!(stacker.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_fs_stacker_writes_manifest() {
        let temp_dir = tempfile::tempdir().unwrap();
        let job = StackJob {
            id: "job-1".to_string(),
            group_id: "G1".to_string(),
            stack_type: None,
            new_type: FrameType::MasterBias,
            source_ids: vec!["b1.fits".to_string(), "b2.fits".to_string()],
            out_file_name: "master_bias_G1.fits".to_string(),
            out_dir: temp_dir.path().join("redux"),
        };

        let outcome = FsStacker.stack(&job).await.unwrap();
        assert!(!outcome.checksum.is_empty());

        let written = std::fs::read_to_string(
            temp_dir.path().join("redux").join("master_bias_G1.fits"),
        )
        .unwrap();
        assert!(written.contains("b1.fits"));
    }
}
