use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::exposure::FrameType;

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Exposure lifecycle
    ExposureIngested {
        exposure_id: String,
        frame_type: Option<FrameType>,
        group_id: String,
        usable: bool,
    },
    ExposureRouted {
        exposure_id: String,
        group_id: String,
        event: String,
    },
    ExposureRejected {
        exposure_id: String,
        reason: String,
    },
    ExposureSkipped {
        exposure_id: String,
    },

    // Dispatch
    StepCompleted {
        exposure_id: String,
        step: String,
    },
    StepFailed {
        exposure_id: String,
        step: String,
        error: String,
    },

    // Stacking
    StackReady {
        group_id: String,
        frame_type: FrameType,
        count: i64,
    },
    MasterBuilt {
        product_id: String,
        group_id: String,
        frame_type: FrameType,
        source_count: usize,
    },
    BuildSkipped {
        group_id: String,
        frame_type: FrameType,
        reason: String,
    },
}

impl AuditEvent {
    /// Stable type tag, used for storage and filtering.
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::ServiceStarted { .. } => "service_started",
            AuditEvent::ServiceStopped { .. } => "service_stopped",
            AuditEvent::ExposureIngested { .. } => "exposure_ingested",
            AuditEvent::ExposureRouted { .. } => "exposure_routed",
            AuditEvent::ExposureRejected { .. } => "exposure_rejected",
            AuditEvent::ExposureSkipped { .. } => "exposure_skipped",
            AuditEvent::StepCompleted { .. } => "step_completed",
            AuditEvent::StepFailed { .. } => "step_failed",
            AuditEvent::StackReady { .. } => "stack_ready",
            AuditEvent::MasterBuilt { .. } => "master_built",
            AuditEvent::BuildSkipped { .. } => "build_skipped",
        }
    }

    /// Exposure this event concerns, if any.
    pub fn exposure_id(&self) -> Option<&str> {
        match self {
            AuditEvent::ExposureIngested { exposure_id, .. }
            | AuditEvent::ExposureRouted { exposure_id, .. }
            | AuditEvent::ExposureRejected { exposure_id, .. }
            | AuditEvent::ExposureSkipped { exposure_id }
            | AuditEvent::StepCompleted { exposure_id, .. }
            | AuditEvent::StepFailed { exposure_id, .. } => Some(exposure_id),
            _ => None,
        }
    }

    /// Calibration group this event concerns, if any.
    pub fn group_id(&self) -> Option<&str> {
        match self {
            AuditEvent::ExposureIngested { group_id, .. }
            | AuditEvent::ExposureRouted { group_id, .. }
            | AuditEvent::StackReady { group_id, .. }
            | AuditEvent::MasterBuilt { group_id, .. }
            | AuditEvent::BuildSkipped { group_id, .. } => Some(group_id),
            _ => None,
        }
    }
}

/// A persisted audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Database ID
    pub id: i64,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Event type tag
    pub event_type: String,
    /// Exposure the event concerns, if any
    pub exposure_id: Option<String>,
    /// Calibration group the event concerns, if any
    pub group_id: Option<String>,
    /// Full event payload
    pub data: AuditEvent,
}
