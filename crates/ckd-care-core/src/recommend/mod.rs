//! Recommendation resolver: stage label → diet plan, exercise plan and
//! lifestyle tips.
//!
//! The plan table is static: the built-in table ships with the crate and a
//! replacement can be loaded from JSON at startup. It is read-only after
//! construction.

mod tips;

pub use tips::*;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{DietPlan, ExercisePlan, Language, StageLabel};

const BUILTIN_PLANS: &str = include_str!("plans.json");

/// Plan table errors.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown stage label in plan table: {0}")]
    UnknownStage(String),

    #[error("Plan table has no \"No CKD\" entry")]
    MissingDefault,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
struct PlanEntry {
    diet: DietPlan,
    exercise: ExercisePlan,
}

/// A resolved plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPlan {
    /// Table entry used (the "No CKD" entry when the requested stage had none)
    pub stage: StageLabel,
    pub diet_plan: DietPlan,
    pub exercise_plan: ExercisePlan,
    pub lifestyle_tips: Vec<String>,
}

/// Stage → plan lookup.
#[derive(Debug, Clone)]
pub struct Recommender {
    plans: HashMap<StageLabel, PlanEntry>,
    default: PlanEntry,
}

impl Recommender {
    /// The plan table shipped with the crate.
    pub fn builtin() -> Result<Self, PlanError> {
        Self::from_json(BUILTIN_PLANS)
    }

    /// Parse a plan table keyed by "No CKD" / "Stage N".
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        let raw: HashMap<String, PlanEntry> = serde_json::from_str(json)?;
        let mut plans = HashMap::with_capacity(raw.len());
        for (label, entry) in raw {
            let stage: StageLabel = label
                .parse()
                .map_err(|_| PlanError::UnknownStage(label.clone()))?;
            plans.insert(stage, entry);
        }
        let default = plans
            .get(&StageLabel::NoCkd)
            .cloned()
            .ok_or(PlanError::MissingDefault)?;
        Ok(Self { plans, default })
    }

    /// Load a plan table from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PlanError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Resolve a stage label given as text. Unknown labels get the
    /// "No CKD" plan.
    pub fn resolve(&self, label: &str, language: Language) -> ResolvedPlan {
        match label.parse::<StageLabel>() {
            Ok(stage) => self.resolve_stage(stage, language),
            Err(_) => self.build(StageLabel::NoCkd, &self.default, language),
        }
    }

    /// Resolve a stage. Stages missing from the table get the "No CKD" plan.
    pub fn resolve_stage(&self, stage: StageLabel, language: Language) -> ResolvedPlan {
        match self.plans.get(&stage) {
            Some(entry) => self.build(stage, entry, language),
            None => self.build(StageLabel::NoCkd, &self.default, language),
        }
    }

    fn build(&self, stage: StageLabel, entry: &PlanEntry, language: Language) -> ResolvedPlan {
        ResolvedPlan {
            stage,
            diet_plan: entry.diet.clone(),
            exercise_plan: entry.exercise.clone(),
            lifestyle_tips: lifestyle_tips(language),
        }
    }
}
