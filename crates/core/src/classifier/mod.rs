//! Exposure classifier.
//!
//! Maps one freshly ingested exposure to a routing decision: which
//! processing path to enter, skip to the no-op path, or reject. The
//! rules live in a fixed priority-ordered table evaluated top to
//! bottom, first match wins. The classifier reads the ledger but never
//! writes it, and never emits events itself.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::InstrumentConfig;
use crate::exposure::{Exposure, FrameType, StackPlan};
use crate::ledger::Ledger;

/// Output of classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RoutingDecision {
    /// Enter the named processing path, optionally carrying stacking
    /// parameters for the path's first step.
    Route {
        event: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        plan: Option<StackPlan>,
    },
    /// Already processed, route to the no-op path.
    Skip,
    /// Processing impossible or a type invariant is violated.
    Reject { reason: String },
}

impl RoutingDecision {
    fn route(event: &str) -> Self {
        RoutingDecision::Route {
            event: event.to_string(),
            plan: None,
        }
    }

    fn route_with_plan(event: &str, plan: StackPlan) -> Self {
        RoutingDecision::Route {
            event: event.to_string(),
            plan: Some(plan),
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        RoutingDecision::Reject {
            reason: reason.into(),
        }
    }
}

/// Everything a rule may consult.
pub struct ClassifyCtx<'a> {
    pub exposure: &'a Exposure,
    pub ledger: &'a dyn Ledger,
    pub config: &'a InstrumentConfig,
}

impl ClassifyCtx<'_> {
    fn is_type(&self, ft: FrameType) -> bool {
        self.exposure.frame_type == Some(ft)
    }

    fn master_file_name(&self, stem: &str) -> String {
        format!("{}_{}.fits", stem, self.exposure.group_id)
    }

    fn stack_plan(
        &self,
        want_type: FrameType,
        stack_type: Option<FrameType>,
        new_type: FrameType,
        min_frames: u32,
        stem: &str,
    ) -> StackPlan {
        StackPlan {
            want_type,
            stack_type,
            new_type,
            min_frames,
            out_file_name: self.master_file_name(stem),
            out_dir: self.config.output_dir.clone(),
        }
    }
}

/// One priority rule: `applies` guards, `decide` produces the decision.
struct Rule {
    name: &'static str,
    applies: fn(&ClassifyCtx) -> bool,
    decide: fn(&ClassifyCtx) -> RoutingDecision,
}

/// Priority-ordered rule table. Order is the contract: the first rule
/// whose `applies` returns true decides, everything below is ignored.
const RULES: &[Rule] = &[
    Rule {
        name: "undetermined_type",
        applies: |ctx| ctx.exposure.frame_type.is_none(),
        decide: |_| RoutingDecision::reject("frame type undetermined"),
    },
    Rule {
        name: "already_processed",
        applies: |ctx| ctx.exposure.in_ledger && !ctx.config.clobber,
        decide: |_| RoutingDecision::Skip,
    },
    Rule {
        name: "bias",
        applies: |ctx| ctx.is_type(FrameType::Bias),
        decide: |ctx| {
            if ctx.exposure.exposure_time_secs > 0.0 {
                return RoutingDecision::reject("bias frame with nonzero exposure time");
            }
            RoutingDecision::route_with_plan(
                "process_bias",
                ctx.stack_plan(
                    FrameType::Bias,
                    None,
                    FrameType::MasterBias,
                    ctx.config.bias_min_nframes,
                    "master_bias",
                ),
            )
        },
    },
    Rule {
        name: "dark",
        applies: |ctx| ctx.is_type(FrameType::Dark),
        decide: |ctx| {
            RoutingDecision::route_with_plan(
                "process_dark",
                ctx.stack_plan(
                    FrameType::Dark,
                    None,
                    FrameType::MasterDark,
                    ctx.config.dark_min_nframes,
                    "master_dark",
                ),
            )
        },
    },
    Rule {
        name: "contbars",
        applies: |ctx| ctx.is_type(FrameType::ContBars),
        decide: |_| RoutingDecision::route("process_contbars"),
    },
    Rule {
        name: "flat",
        applies: |ctx| {
            ctx.is_type(FrameType::FlatLamp)
                || ctx.is_type(FrameType::DomeFlat)
                || ctx.is_type(FrameType::TwiFlat)
        },
        decide: |ctx| {
            let plan = match ctx.exposure.frame_type {
                Some(FrameType::FlatLamp) => ctx.stack_plan(
                    FrameType::FlatLamp,
                    Some(FrameType::StackedFlat),
                    FrameType::MasterFlat,
                    ctx.config.flat_min_nframes,
                    "master_flat",
                ),
                Some(FrameType::DomeFlat) => ctx.stack_plan(
                    FrameType::DomeFlat,
                    Some(FrameType::StackedDome),
                    FrameType::MasterDome,
                    ctx.config.dome_min_nframes,
                    "master_dome",
                ),
                _ => ctx.stack_plan(
                    FrameType::TwiFlat,
                    Some(FrameType::StackedTwiFlat),
                    FrameType::MasterTwiFlat,
                    ctx.config.twiflat_min_nframes,
                    "master_twiflat",
                ),
            };
            RoutingDecision::route_with_plan("process_flat", plan)
        },
    },
    Rule {
        name: "arc",
        applies: |ctx| ctx.is_type(FrameType::ArcLamp),
        decide: |_| RoutingDecision::route("process_arc"),
    },
    Rule {
        name: "object",
        applies: |ctx| ctx.is_type(FrameType::Object),
        decide: |ctx| {
            if ctx.exposure.nod_shuffle_mask && ctx.exposure.open_shutters > 1 {
                return RoutingDecision::route("process_nod_shuffle");
            }
            // The standard object path produces a sky companion; the
            // plan's new_type tells the sky step what to record.
            RoutingDecision::route_with_plan(
                "process_object",
                ctx.stack_plan(FrameType::Object, None, FrameType::Sky, 0, "sky"),
            )
        },
    },
];

/// Classify one exposure. Reads the ledger view, emits nothing.
pub fn classify(
    exposure: &Exposure,
    ledger: &dyn Ledger,
    config: &InstrumentConfig,
) -> RoutingDecision {
    let ctx = ClassifyCtx {
        exposure,
        ledger,
        config,
    };

    for rule in RULES {
        if (rule.applies)(&ctx) {
            let decision = (rule.decide)(&ctx);
            debug!(
                exposure = %exposure.id,
                rule = rule.name,
                ?decision,
                "classified exposure"
            );
            return decision;
        }
    }

    RoutingDecision::reject("no routing rule matched")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SqliteLedger;

    fn test_config() -> InstrumentConfig {
        InstrumentConfig::default()
    }

    fn classify_one(exposure: &Exposure) -> RoutingDecision {
        let ledger = SqliteLedger::in_memory().unwrap();
        classify(exposure, &ledger, &test_config())
    }

    fn routed_event(decision: &RoutingDecision) -> &str {
        match decision {
            RoutingDecision::Route { event, .. } => event,
            other => panic!("expected Route, got {:?}", other),
        }
    }

    #[test]
    fn test_undetermined_type_rejected() {
        let exp = Exposure::new("x1.fits", None, "G1");
        assert!(matches!(
            classify_one(&exp),
            RoutingDecision::Reject { .. }
        ));
    }

    #[test]
    fn test_undetermined_beats_every_other_rule() {
        // Even an already-ingested frame with nod flags set rejects first
        let mut exp = Exposure::new("x1.fits", None, "G1").with_shutter_mode(true, 2);
        exp.in_ledger = true;
        assert!(matches!(
            classify_one(&exp),
            RoutingDecision::Reject { .. }
        ));
    }

    #[test]
    fn test_already_in_ledger_skips_when_clobber_disabled() {
        let mut exp = Exposure::new("b1.fits", Some(FrameType::Bias), "G1");
        exp.in_ledger = true;
        assert_eq!(classify_one(&exp), RoutingDecision::Skip);
    }

    #[test]
    fn test_already_in_ledger_reroutes_when_clobber_enabled() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let mut config = test_config();
        config.clobber = true;

        let mut exp = Exposure::new("b1.fits", Some(FrameType::Bias), "G1");
        exp.in_ledger = true;

        let decision = classify(&exp, &ledger, &config);
        assert_eq!(routed_event(&decision), "process_bias");
    }

    #[test]
    fn test_nonzero_duration_bias_rejected() {
        let exp = Exposure::new("b1.fits", Some(FrameType::Bias), "G1").with_exposure_time(0.1);
        assert!(matches!(
            classify_one(&exp),
            RoutingDecision::Reject { .. }
        ));
    }

    #[test]
    fn test_bias_routes_with_plan() {
        let exp = Exposure::new("b1.fits", Some(FrameType::Bias), "G1");
        let decision = classify_one(&exp);
        match decision {
            RoutingDecision::Route { event, plan } => {
                assert_eq!(event, "process_bias");
                let plan = plan.unwrap();
                assert_eq!(plan.want_type, FrameType::Bias);
                assert_eq!(plan.new_type, FrameType::MasterBias);
                assert_eq!(plan.min_frames, test_config().bias_min_nframes);
                assert_eq!(plan.out_file_name, "master_bias_G1.fits");
            }
            other => panic!("expected Route, got {:?}", other),
        }
    }

    #[test]
    fn test_dark_routes_with_plan() {
        let exp =
            Exposure::new("d1.fits", Some(FrameType::Dark), "G1").with_exposure_time(300.0);
        let decision = classify_one(&exp);
        match decision {
            RoutingDecision::Route { event, plan } => {
                assert_eq!(event, "process_dark");
                assert_eq!(plan.unwrap().new_type, FrameType::MasterDark);
            }
            other => panic!("expected Route, got {:?}", other),
        }
    }

    #[test]
    fn test_contbars_and_arc_route_without_plan() {
        let bars = Exposure::new("cb1.fits", Some(FrameType::ContBars), "G1");
        assert_eq!(
            classify_one(&bars),
            RoutingDecision::route("process_contbars")
        );

        let arc = Exposure::new("a1.fits", Some(FrameType::ArcLamp), "G1");
        assert_eq!(classify_one(&arc), RoutingDecision::route("process_arc"));
    }

    #[test]
    fn test_flat_subtypes_carry_own_parameters() {
        let cases = [
            (FrameType::FlatLamp, FrameType::MasterFlat, "master_flat_G1.fits"),
            (FrameType::DomeFlat, FrameType::MasterDome, "master_dome_G1.fits"),
            (FrameType::TwiFlat, FrameType::MasterTwiFlat, "master_twiflat_G1.fits"),
        ];
        for (raw, master, file_name) in cases {
            let exp = Exposure::new("f1.fits", Some(raw), "G1").with_exposure_time(10.0);
            match classify_one(&exp) {
                RoutingDecision::Route { event, plan } => {
                    assert_eq!(event, "process_flat");
                    let plan = plan.unwrap();
                    assert_eq!(plan.want_type, raw);
                    assert_eq!(plan.new_type, master);
                    assert_eq!(plan.out_file_name, file_name);
                }
                other => panic!("expected Route for {:?}, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_nod_shuffle_object_routing() {
        let ns = Exposure::new("o1.fits", Some(FrameType::Object), "G1")
            .with_shutter_mode(true, 2);
        assert_eq!(
            classify_one(&ns),
            RoutingDecision::route("process_nod_shuffle")
        );

        // Mask without multiple open shutters is a standard object
        let single = Exposure::new("o2.fits", Some(FrameType::Object), "G1")
            .with_shutter_mode(true, 1);
        match classify_one(&single) {
            RoutingDecision::Route { event, plan } => {
                assert_eq!(event, "process_object");
                assert_eq!(plan.unwrap().new_type, FrameType::Sky);
            }
            other => panic!("expected Route, got {:?}", other),
        }
    }

    #[test]
    fn test_derived_type_falls_through_to_reject() {
        let exp = Exposure::new("m1.fits", Some(FrameType::MasterBias), "G1");
        assert!(matches!(
            classify_one(&exp),
            RoutingDecision::Reject { .. }
        ));
    }
}
