//! Recommendation models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::labels::{now, Language, StageLabel};
use super::patient::generate_id;

/// Daily diet plan for a stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DietPlan {
    pub breakfast: String,
    pub lunch: String,
    pub dinner: String,
    pub snacks: String,
    pub fluid_intake: String,
    pub sodium_limit: String,
    pub protein_intake: String,
    pub restrictions: String,
}

/// Exercise plan for a stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExercisePlan {
    pub daily_activity: String,
    pub recommended_exercises: Vec<String>,
    pub frequency: String,
    pub intensity: String,
    pub duration: String,
    pub precautions: String,
    pub benefits: String,
}

/// Who issued a recommendation. Stored as `system` or `clinician:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RecommendationSource {
    System,
    Clinician(String),
}

impl fmt::Display for RecommendationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendationSource::System => f.write_str("system"),
            RecommendationSource::Clinician(id) => write!(f, "clinician:{}", id),
        }
    }
}

impl FromStr for RecommendationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "system" {
            return Ok(RecommendationSource::System);
        }
        match s.strip_prefix("clinician:") {
            Some(id) if !id.is_empty() => Ok(RecommendationSource::Clinician(id.to_string())),
            _ => Err(format!("Unknown recommendation source: {}", s)),
        }
    }
}

impl TryFrom<String> for RecommendationSource {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RecommendationSource> for String {
    fn from(source: RecommendationSource) -> Self {
        source.to_string()
    }
}

/// A diet/exercise/lifestyle recommendation issued to a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    /// Stable id (`REC_` prefix)
    pub recommendation_id: String,
    pub patient_id: String,
    /// Stage copied from the triggering prediction (or chosen by a clinician)
    pub stage: StageLabel,
    pub diet_plan: DietPlan,
    pub exercise_plan: ExercisePlan,
    pub lifestyle_tips: Vec<String>,
    /// Language the tips were rendered in
    pub language: Language,
    pub created_by: RecommendationSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recommendation {
    /// Create a new recommendation for a patient.
    pub fn new(
        patient_id: String,
        stage: StageLabel,
        diet_plan: DietPlan,
        exercise_plan: ExercisePlan,
        lifestyle_tips: Vec<String>,
        language: Language,
        created_by: RecommendationSource,
    ) -> Self {
        let now = now();
        Self {
            recommendation_id: generate_id("REC"),
            patient_id,
            stage,
            diet_plan,
            exercise_plan,
            lifestyle_tips,
            language,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}
