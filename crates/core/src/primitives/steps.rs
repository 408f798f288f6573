//! Small per-exposure steps.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{Primitive, PrimitiveError, RunContext};
use crate::exposure::{FrameType, Payload};
use crate::ledger::NewProductRecord;

/// Accepts a payload and performs no work. Used to absorb exposures the
/// ledger reports as already processed.
pub struct Noop;

#[async_trait]
impl Primitive for Noop {
    fn name(&self) -> &str {
        "noop"
    }

    async fn apply(&self, payload: Payload, _ctx: &RunContext) -> Result<Payload, PrimitiveError> {
        Ok(payload)
    }
}

/// Stamps the processing history and passes the payload on. Stands in
/// for the numeric work of a chain step, which happens in an external
/// collaborator and is opaque to the engine.
pub struct MarkStep {
    name: &'static str,
}

impl MarkStep {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Primitive for MarkStep {
    fn name(&self) -> &str {
        self.name
    }

    async fn apply(&self, payload: Payload, _ctx: &RunContext) -> Result<Payload, PrimitiveError> {
        let mut payload = payload;
        payload.exposure.record_step(self.name);
        debug!(exposure = %payload.exposure.id, step = self.name, "step applied");
        Ok(payload)
    }
}

/// Produces the object's sky companion and records it in the ledger.
/// Idempotent: a sky already recorded for this exposure is left alone.
pub struct MakeSky;

#[async_trait]
impl Primitive for MakeSky {
    fn name(&self) -> &str {
        "make_sky"
    }

    async fn apply(&self, payload: Payload, ctx: &RunContext) -> Result<Payload, PrimitiveError> {
        let mut payload = payload;

        let companion_type = payload
            .plan
            .as_ref()
            .map(|p| p.new_type)
            .unwrap_or(FrameType::Sky);
        let sky_id = format!("sky_{}", payload.exposure.id);

        if !ctx.ledger.contains_frame(&sky_id)? {
            let mut hasher = Sha256::new();
            hasher.update(sky_id.as_bytes());
            ctx.ledger.record_product(NewProductRecord {
                frame_id: sky_id,
                frame_type: companion_type,
                group_id: payload.exposure.group_id.clone(),
                source_ids: vec![payload.exposure.id.clone()],
                checksum: format!("{:x}", hasher.finalize()),
            })?;
        }

        payload.exposure.record_step("make_sky");
        Ok(payload)
    }
}
