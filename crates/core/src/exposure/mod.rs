//! Exposure data model.
//!
//! An [`Exposure`] is one captured instrument frame: identity fields are
//! fixed at ingestion from the header metadata, auxiliary fields (history,
//! quality flags) are appended by processing steps as the frame travels
//! through the engine.

mod types;

pub use types::{
    Exposure, FrameType, HistoryEntry, Payload, StackPlan, sequence_from_filename,
};
