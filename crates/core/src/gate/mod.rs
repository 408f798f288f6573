//! Readiness gate.
//!
//! Decides whether a calibration group has accumulated enough raw
//! frames to build a combined master, and whether that master already
//! exists. Counts are recomputed from the ledger on every call, so the
//! gate holds no state of its own and makes no assumption about
//! arrival order or batch size.

use crate::exposure::FrameType;
use crate::ledger::{Ledger, LedgerError};

/// True iff the group holds at least `min_frames` usable raw frames of
/// `want_type`. A zero threshold is ready immediately; it is not
/// special-cased, the comparison handles it.
pub fn is_ready(
    ledger: &dyn Ledger,
    group_id: &str,
    want_type: FrameType,
    min_frames: u32,
) -> Result<bool, LedgerError> {
    let count = ledger.count(want_type, group_id)?;
    Ok(count >= i64::from(min_frames))
}

/// True iff a live (non-superseded) master of `new_type` exists for the
/// group.
pub fn already_built(
    ledger: &dyn Ledger,
    group_id: &str,
    new_type: FrameType,
) -> Result<bool, LedgerError> {
    ledger.exists(new_type, group_id)
}
