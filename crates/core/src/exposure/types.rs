//! Core exposure data types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Frame type vocabulary, raw and derived.
///
/// The string tags match the header vocabulary written by the instrument
/// and carried through the ledger, so they are stable identifiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FrameType {
    // Raw frame types
    #[serde(rename = "BIAS")]
    Bias,
    #[serde(rename = "DARK")]
    Dark,
    #[serde(rename = "CONTBARS")]
    ContBars,
    #[serde(rename = "FLATLAMP")]
    FlatLamp,
    #[serde(rename = "DOMEFLAT")]
    DomeFlat,
    #[serde(rename = "TWIFLAT")]
    TwiFlat,
    #[serde(rename = "ARCLAMP")]
    ArcLamp,
    #[serde(rename = "OBJECT")]
    Object,

    // Derived (master/stacked) types
    #[serde(rename = "MBIAS")]
    MasterBias,
    #[serde(rename = "MDARK")]
    MasterDark,
    #[serde(rename = "SFLAT")]
    StackedFlat,
    #[serde(rename = "MFLAT")]
    MasterFlat,
    #[serde(rename = "SDOME")]
    StackedDome,
    #[serde(rename = "MDOME")]
    MasterDome,
    #[serde(rename = "STWIF")]
    StackedTwiFlat,
    #[serde(rename = "MTWIF")]
    MasterTwiFlat,
    #[serde(rename = "SKY")]
    Sky,
}

impl FrameType {
    /// Returns the header/ledger tag for this type.
    pub fn tag(&self) -> &'static str {
        match self {
            FrameType::Bias => "BIAS",
            FrameType::Dark => "DARK",
            FrameType::ContBars => "CONTBARS",
            FrameType::FlatLamp => "FLATLAMP",
            FrameType::DomeFlat => "DOMEFLAT",
            FrameType::TwiFlat => "TWIFLAT",
            FrameType::ArcLamp => "ARCLAMP",
            FrameType::Object => "OBJECT",
            FrameType::MasterBias => "MBIAS",
            FrameType::MasterDark => "MDARK",
            FrameType::StackedFlat => "SFLAT",
            FrameType::MasterFlat => "MFLAT",
            FrameType::StackedDome => "SDOME",
            FrameType::MasterDome => "MDOME",
            FrameType::StackedTwiFlat => "STWIF",
            FrameType::MasterTwiFlat => "MTWIF",
            FrameType::Sky => "SKY",
        }
    }

    /// Parses a header tag. Returns None for unrecognized tags
    /// (type undetermined).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "BIAS" => Some(FrameType::Bias),
            "DARK" => Some(FrameType::Dark),
            "CONTBARS" => Some(FrameType::ContBars),
            "FLATLAMP" => Some(FrameType::FlatLamp),
            "DOMEFLAT" => Some(FrameType::DomeFlat),
            "TWIFLAT" => Some(FrameType::TwiFlat),
            "ARCLAMP" => Some(FrameType::ArcLamp),
            "OBJECT" => Some(FrameType::Object),
            "MBIAS" => Some(FrameType::MasterBias),
            "MDARK" => Some(FrameType::MasterDark),
            "SFLAT" => Some(FrameType::StackedFlat),
            "MFLAT" => Some(FrameType::MasterFlat),
            "SDOME" => Some(FrameType::StackedDome),
            "MDOME" => Some(FrameType::MasterDome),
            "STWIF" => Some(FrameType::StackedTwiFlat),
            "MTWIF" => Some(FrameType::MasterTwiFlat),
            "SKY" => Some(FrameType::Sky),
            _ => None,
        }
    }

    /// Returns true for raw (directly observed) frame types.
    pub fn is_raw(&self) -> bool {
        matches!(
            self,
            FrameType::Bias
                | FrameType::Dark
                | FrameType::ContBars
                | FrameType::FlatLamp
                | FrameType::DomeFlat
                | FrameType::TwiFlat
                | FrameType::ArcLamp
                | FrameType::Object
        )
    }

    /// Returns true for derived (master/stacked) frame types.
    pub fn is_derived(&self) -> bool {
        !self.is_raw()
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One processing step applied to an exposure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    /// Step name as declared in the event graph.
    pub step: String,
    /// When the step completed.
    pub at: DateTime<Utc>,
}

static SEQUENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_(\d+)\.[A-Za-z]+$").unwrap());

/// Extracts the trailing sequence number from an exposure filename,
/// e.g. `kb230401_00042.fits` -> 42.
pub fn sequence_from_filename(name: &str) -> Option<u32> {
    SEQUENCE_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// One observed instrument frame with its header metadata.
///
/// Identity (`id`, `frame_type`, `group_id`) is immutable after ingestion;
/// `history` and `quality_flags` accumulate as processing progresses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exposure {
    /// Unique identifier (the exposure filename).
    pub id: String,

    /// Frame type from the header, None when the type could not be
    /// determined.
    pub frame_type: Option<FrameType>,

    /// Calibration group this exposure belongs to.
    pub group_id: String,

    /// Exposure duration in seconds.
    pub exposure_time_secs: f64,

    /// Instrument configuration/state identifier.
    pub config_id: String,

    /// Camera channel (e.g. "BLUE", "RED").
    #[serde(default)]
    pub camera: String,

    /// Nod-and-shuffle mask in the beam.
    #[serde(default)]
    pub nod_shuffle_mask: bool,

    /// Number of open shutter positions.
    #[serde(default = "default_open_shutters")]
    pub open_shutters: u32,

    /// Whether this exposure was already present in the ledger at
    /// ingestion time. Set by the ingest step.
    #[serde(default)]
    pub in_ledger: bool,

    /// Processing steps applied so far.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,

    /// Quality flags raised during processing.
    #[serde(default)]
    pub quality_flags: Vec<String>,
}

fn default_open_shutters() -> u32 {
    1
}

impl Exposure {
    /// Create a new exposure from parsed header metadata.
    pub fn new(
        id: impl Into<String>,
        frame_type: Option<FrameType>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            frame_type,
            group_id: group_id.into(),
            exposure_time_secs: 0.0,
            config_id: String::new(),
            camera: String::new(),
            nod_shuffle_mask: false,
            open_shutters: 1,
            in_ledger: false,
            history: Vec::new(),
            quality_flags: Vec::new(),
        }
    }

    /// Set the exposure duration.
    pub fn with_exposure_time(mut self, secs: f64) -> Self {
        self.exposure_time_secs = secs;
        self
    }

    /// Set the instrument configuration id.
    pub fn with_config_id(mut self, config_id: impl Into<String>) -> Self {
        self.config_id = config_id.into();
        self
    }

    /// Set the camera channel.
    pub fn with_camera(mut self, camera: impl Into<String>) -> Self {
        self.camera = camera.into();
        self
    }

    /// Set the shutter/nod-mode flags.
    pub fn with_shutter_mode(mut self, nod_shuffle_mask: bool, open_shutters: u32) -> Self {
        self.nod_shuffle_mask = nod_shuffle_mask;
        self.open_shutters = open_shutters;
        self
    }

    /// Appends a completed step to the processing history.
    pub fn record_step(&mut self, step: impl Into<String>) {
        self.history.push(HistoryEntry {
            step: step.into(),
            at: Utc::now(),
        });
    }

    /// Raises a quality flag.
    pub fn flag(&mut self, flag: impl Into<String>) {
        self.quality_flags.push(flag.into());
    }

    /// Type-invariant check: bias frames must have zero duration.
    /// Other raw types have no duration policy.
    pub fn satisfies_type_policy(&self) -> bool {
        match self.frame_type {
            Some(FrameType::Bias) => self.exposure_time_secs <= 0.0,
            _ => true,
        }
    }

    /// Trailing sequence number parsed from the filename, if present.
    pub fn sequence_number(&self) -> Option<u32> {
        sequence_from_filename(&self.id)
    }
}

/// Routing parameters attached to an exposure by the classifier and
/// consumed by the first step of a stacking path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StackPlan {
    /// Raw frame type to count toward readiness.
    pub want_type: FrameType,
    /// Intermediate stacked type, when the path produces one.
    pub stack_type: Option<FrameType>,
    /// Master type the build produces.
    pub new_type: FrameType,
    /// Minimum raw frames required before a build triggers.
    pub min_frames: u32,
    /// Destination filename of the master product.
    pub out_file_name: String,
    /// Destination directory of the master product.
    pub out_dir: PathBuf,
}

/// The unit that travels through the event graph: the exposure plus the
/// routing parameters its path carries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payload {
    pub exposure: Exposure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<StackPlan>,
}

impl Payload {
    /// Wrap a freshly ingested exposure with no routing parameters.
    pub fn new(exposure: Exposure) -> Self {
        Self {
            exposure,
            plan: None,
        }
    }

    /// Attach routing parameters.
    pub fn with_plan(mut self, plan: StackPlan) -> Self {
        self.plan = Some(plan);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_tag_round_trip() {
        for ft in [
            FrameType::Bias,
            FrameType::Dark,
            FrameType::ContBars,
            FrameType::FlatLamp,
            FrameType::DomeFlat,
            FrameType::TwiFlat,
            FrameType::ArcLamp,
            FrameType::Object,
            FrameType::MasterBias,
            FrameType::MasterFlat,
            FrameType::Sky,
        ] {
            assert_eq!(FrameType::from_tag(ft.tag()), Some(ft));
        }
    }

    #[test]
    fn test_frame_type_unknown_tag() {
        assert_eq!(FrameType::from_tag("SPECKLE"), None);
        assert_eq!(FrameType::from_tag(""), None);
    }

    #[test]
    fn test_frame_type_tag_case_insensitive() {
        assert_eq!(FrameType::from_tag("bias"), Some(FrameType::Bias));
        assert_eq!(FrameType::from_tag(" FlatLamp "), Some(FrameType::FlatLamp));
    }

    #[test]
    fn test_raw_vs_derived() {
        assert!(FrameType::FlatLamp.is_raw());
        assert!(!FrameType::FlatLamp.is_derived());
        assert!(FrameType::MasterFlat.is_derived());
        assert!(FrameType::Sky.is_derived());
    }

    #[test]
    fn test_frame_type_serialization_uses_tags() {
        let json = serde_json::to_string(&FrameType::MasterBias).unwrap();
        assert_eq!(json, "\"MBIAS\"");
        let parsed: FrameType = serde_json::from_str("\"TWIFLAT\"").unwrap();
        assert_eq!(parsed, FrameType::TwiFlat);
    }

    #[test]
    fn test_sequence_from_filename() {
        assert_eq!(sequence_from_filename("kb230401_00042.fits"), Some(42));
        assert_eq!(sequence_from_filename("kr231115_1.fits"), Some(1));
        assert_eq!(sequence_from_filename("no_sequence.txt"), None);
        assert_eq!(sequence_from_filename("plain"), None);
    }

    #[test]
    fn test_bias_policy() {
        let good = Exposure::new("b1.fits", Some(FrameType::Bias), "G1");
        assert!(good.satisfies_type_policy());

        let bad = Exposure::new("b2.fits", Some(FrameType::Bias), "G1")
            .with_exposure_time(1.5);
        assert!(!bad.satisfies_type_policy());

        let dark = Exposure::new("d1.fits", Some(FrameType::Dark), "G1")
            .with_exposure_time(300.0);
        assert!(dark.satisfies_type_policy());
    }

    #[test]
    fn test_record_step_appends_history() {
        let mut exp = Exposure::new("o1.fits", Some(FrameType::Object), "G1");
        exp.record_step("subtract_bias");
        exp.record_step("correct_gain");
        assert_eq!(exp.history.len(), 2);
        assert_eq!(exp.history[0].step, "subtract_bias");
        assert_eq!(exp.history[1].step, "correct_gain");
    }

    #[test]
    fn test_payload_serialization() {
        let exp = Exposure::new("f1.fits", Some(FrameType::FlatLamp), "G1");
        let payload = Payload::new(exp).with_plan(StackPlan {
            want_type: FrameType::FlatLamp,
            stack_type: Some(FrameType::StackedFlat),
            new_type: FrameType::MasterFlat,
            min_frames: 6,
            out_file_name: "master_flat_G1.fits".to_string(),
            out_dir: PathBuf::from("redux"),
        });

        let json = serde_json::to_string(&payload).unwrap();
        let parsed: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, payload);
    }
}
