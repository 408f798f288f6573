//! The static event table.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

/// Error type for graph construction and validation.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("event '{event}' is declared more than once")]
    DuplicateEvent { event: String },
    #[error("event '{event}' names successor '{next}' which is not declared")]
    DanglingSuccessor { event: String, next: String },
    #[error("event '{event}' is part of a cycle; every path must terminate")]
    Cycle { event: String },
    #[error("event '{event}' binds work '{work}' which is not registered")]
    UnknownWork { event: String, work: String },
}

/// One step of the graph: the work it triggers, the notice logged when
/// it starts, and the event raised on success (None = terminal).
#[derive(Debug, Clone)]
pub struct Step {
    pub work: String,
    pub started_notice: String,
    pub next: Option<String>,
}

impl Step {
    pub fn new(work: &str, started_notice: &str, next: Option<&str>) -> Self {
        Self {
            work: work.to_string(),
            started_notice: started_notice.to_string(),
            next: next.map(str::to_string),
        }
    }
}

/// Event name → step table. Read-only after initialization; shared by
/// all in-flight exposures and holds no per-exposure state.
#[derive(Debug, Default)]
pub struct EventGraph {
    steps: HashMap<String, Step>,
}

impl EventGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a step under an event name.
    pub fn register(&mut self, event: &str, step: Step) -> Result<(), GraphError> {
        if self.steps.contains_key(event) {
            return Err(GraphError::DuplicateEvent {
                event: event.to_string(),
            });
        }
        self.steps.insert(event.to_string(), step);
        Ok(())
    }

    pub fn get(&self, event: &str) -> Option<&Step> {
        self.steps.get(event)
    }

    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check structural soundness: every successor is declared and
    /// every chain reaches a terminal step.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (event, step) in &self.steps {
            if let Some(next) = &step.next {
                if !self.steps.contains_key(next) {
                    return Err(GraphError::DanglingSuccessor {
                        event: event.clone(),
                        next: next.clone(),
                    });
                }
            }
        }

        // Walk each chain; revisiting a node within one walk is a cycle.
        for start in self.steps.keys() {
            let mut visited = HashSet::new();
            let mut current = start.as_str();
            loop {
                if !visited.insert(current) {
                    return Err(GraphError::Cycle {
                        event: start.clone(),
                    });
                }
                match self.steps[current].next.as_deref() {
                    Some(next) => current = next,
                    None => break,
                }
            }
        }

        Ok(())
    }

    /// Check every bound work name against the registered primitives.
    pub fn validate_work(&self, known: &HashSet<String>) -> Result<(), GraphError> {
        for (event, step) in &self.steps {
            if !known.contains(&step.work) {
                return Err(GraphError::UnknownWork {
                    event: event.clone(),
                    work: step.work.clone(),
                });
            }
        }
        Ok(())
    }
}

/// The standard reduction graph.
///
/// Ingestion feeds the planner, which classifies and re-emits onto one
/// of the typed processing paths. Calibration paths end in a stacking
/// step gated on group readiness; the object path is a longer chain of
/// per-exposure steps ending at flux calibration.
pub fn default_graph() -> EventGraph {
    let mut g = EventGraph::new();

    let steps: &[(&str, &str, &str, Option<&str>)] = &[
        // (event, work, started_notice, next)
        ("noop", "noop", "noop", None),
        ("next_file", "ingest_frame", "ingesting frame", Some("file_ingested")),
        ("file_ingested", "action_planner", "deciding what to do", None),
        ("process_bias", "stack_calibration", "processing bias", None),
        ("process_dark", "stack_calibration", "processing dark", None),
        ("process_contbars", "trace_bars", "tracing continuum bars", None),
        ("process_arc", "arc_solve", "solving arc geometry", None),
        (
            "process_flat",
            "stack_calibration",
            "processing flat",
            Some("flat_correct_illumination"),
        ),
        (
            "flat_correct_illumination",
            "correct_illumination",
            "correcting illumination",
            None,
        ),
        (
            "process_nod_shuffle",
            "subtract_nod_shuffle",
            "subtracting nod-and-shuffle background",
            None,
        ),
        // Standard object chain
        (
            "process_object",
            "subtract_sine",
            "subtracting sine pattern",
            Some("object_subtract_bias"),
        ),
        (
            "object_subtract_bias",
            "subtract_bias",
            "subtracting bias",
            Some("object_subtract_overscan"),
        ),
        (
            "object_subtract_overscan",
            "subtract_overscan",
            "subtracting overscan",
            Some("object_trim_overscan"),
        ),
        (
            "object_trim_overscan",
            "trim_overscan",
            "trimming overscan",
            Some("object_correct_gain"),
        ),
        (
            "object_correct_gain",
            "correct_gain",
            "correcting gain",
            Some("object_correct_defects"),
        ),
        (
            "object_correct_defects",
            "correct_defects",
            "correcting defects",
            Some("object_remove_crs"),
        ),
        (
            "object_remove_crs",
            "remove_crs",
            "removing cosmic rays",
            Some("object_create_unc"),
        ),
        (
            "object_create_unc",
            "create_unc",
            "creating uncertainty image",
            Some("object_rectify_image"),
        ),
        (
            "object_rectify_image",
            "rectify_image",
            "rectifying image",
            Some("object_subtract_dark"),
        ),
        (
            "object_subtract_dark",
            "subtract_dark",
            "subtracting dark",
            Some("object_subtract_scat"),
        ),
        (
            "object_subtract_scat",
            "subtract_scattered_light",
            "subtracting scattered light",
            Some("object_correct_illum"),
        ),
        (
            "object_correct_illum",
            "correct_illumination",
            "correcting illumination",
            Some("object_make_sky"),
        ),
        ("object_make_sky", "make_sky", "making sky", Some("object_subtract_sky")),
        (
            "object_subtract_sky",
            "subtract_sky",
            "subtracting sky",
            Some("object_make_cube"),
        ),
        (
            "object_make_cube",
            "make_cube",
            "making data cube",
            Some("object_wavelengthcorr"),
        ),
        (
            "object_wavelengthcorr",
            "correct_wavelengths",
            "correcting wavelengths",
            Some("object_correct_dar"),
        ),
        (
            "object_correct_dar",
            "correct_dar",
            "correcting differential refraction",
            Some("object_make_invsens"),
        ),
        (
            "object_make_invsens",
            "make_invsens",
            "making inverse sensitivity",
            Some("object_flux_calibrate"),
        ),
        (
            "object_flux_calibrate",
            "flux_calibrate",
            "calibrating flux",
            None,
        ),
    ];

    for (event, work, notice, next) in steps {
        // Names are static literals, duplicates cannot occur here.
        g.register(event, Step::new(work, notice, *next))
            .unwrap_or_else(|_| unreachable!("duplicate event in default graph"));
    }

    g
}
