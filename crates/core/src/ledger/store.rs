//! Ledger storage trait and types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exposure::FrameType;

/// Error type for ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Entry not found.
    #[error("ledger entry not found: {0}")]
    NotFound(String),
    /// A frame with the same id is already recorded.
    #[error("frame already recorded: {0}")]
    Duplicate(String),
    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

/// Whether an entry records an observed frame or a built product.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Raw,
    Product,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Raw => "raw",
            EntryKind::Product => "product",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "raw" => Some(EntryKind::Raw),
            "product" => Some(EntryKind::Product),
            _ => None,
        }
    }
}

/// One row of the provenance ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    /// Database rowid.
    pub id: i64,
    /// Frame or product filename.
    pub frame_id: String,
    /// Frame type at recording time.
    pub frame_type: FrameType,
    /// Calibration group.
    pub group_id: String,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Raw frame or built product.
    pub kind: EntryKind,
    /// For products: the frame ids that went into the build.
    pub source_ids: Vec<String>,
    /// SHA-256 of the recorded payload.
    pub checksum: String,
    /// False when the frame failed an ingestion policy check and must
    /// not count toward readiness.
    pub usable: bool,
    /// True when a later clobber build replaced this product.
    pub superseded: bool,
}

/// Request to record an observed frame.
#[derive(Debug, Clone)]
pub struct NewFrameRecord {
    pub frame_id: String,
    pub frame_type: FrameType,
    pub group_id: String,
    pub checksum: String,
    pub usable: bool,
}

/// Request to record a built master product.
#[derive(Debug, Clone)]
pub struct NewProductRecord {
    pub frame_id: String,
    pub frame_type: FrameType,
    pub group_id: String,
    pub source_ids: Vec<String>,
    pub checksum: String,
}

/// Filter for listing ledger entries.
#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    /// Filter by frame type.
    pub frame_type: Option<FrameType>,
    /// Filter by calibration group.
    pub group_id: Option<String>,
    /// Filter by entry kind.
    pub kind: Option<EntryKind>,
    /// Include superseded products.
    pub include_superseded: bool,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl LedgerFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            frame_type: None,
            group_id: None,
            kind: None,
            include_superseded: false,
            limit: 100,
            offset: 0,
        }
    }

    /// Filter by frame type.
    pub fn with_frame_type(mut self, frame_type: FrameType) -> Self {
        self.frame_type = Some(frame_type);
        self
    }

    /// Filter by calibration group.
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Filter by entry kind.
    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Include superseded products in the results.
    pub fn include_superseded(mut self) -> Self {
        self.include_superseded = true;
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for ledger storage backends.
///
/// Implementations serialize all access internally; callers never need
/// external locking, and a count followed by a claim observes a
/// consistent snapshot via [`Ledger::try_claim_build`].
pub trait Ledger: Send + Sync {
    /// Record an observed frame. Recording the same frame id twice
    /// returns [`LedgerError::Duplicate`].
    fn record_frame(&self, record: NewFrameRecord) -> Result<LedgerEntry, LedgerError>;

    /// Record a built master product.
    fn record_product(&self, record: NewProductRecord) -> Result<LedgerEntry, LedgerError>;

    /// All live entries matching (frame_type, group_id).
    fn search(&self, frame_type: FrameType, group_id: &str) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Whether any live entry matches (frame_type, group_id).
    fn exists(&self, frame_type: FrameType, group_id: &str) -> Result<bool, LedgerError>;

    /// Number of usable live entries matching (frame_type, group_id).
    /// Frames recorded with `usable: false` are excluded.
    fn count(&self, frame_type: FrameType, group_id: &str) -> Result<i64, LedgerError>;

    /// Whether a frame with this id has been recorded, usable or not.
    fn contains_frame(&self, frame_id: &str) -> Result<bool, LedgerError>;

    /// Atomically claim the build of `new_type` for `group_id`.
    ///
    /// Returns true when the caller won the claim and must run the
    /// build. Returns false when another caller holds the claim or a
    /// product already exists (and `clobber` is false). With `clobber`
    /// set, an existing product is marked superseded and the claim is
    /// re-taken.
    fn try_claim_build(
        &self,
        group_id: &str,
        new_type: FrameType,
        product_id: &str,
        clobber: bool,
    ) -> Result<bool, LedgerError>;

    /// Release a claim after a failed build so a later frame can retry.
    fn release_claim(&self, group_id: &str, new_type: FrameType) -> Result<(), LedgerError>;

    /// List entries matching the filter, newest first.
    fn list(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, LedgerError>;
}
