//! Prediction pipeline: normalize → scale → classify → derive → explain →
//! persist the prediction together with its recommendation.
//!
//! # Failure policy
//!
//! - Unknown patients fail before any model call; malformed input fails
//!   before the classifier runs.
//! - [`PredictionPipeline::compute`] needs no storage, so callers sharing a
//!   database can run it without holding their lock.
//! - A classifier error or timeout aborts with nothing written.
//! - A missing, failing or slow explainer is reported as a
//!   [`PartialFailure`] and the prediction is stored without attribution.
//! - The prediction and its recommendation are written in one transaction.

mod bounded;
mod bundle;
mod derivation;
mod normalizer;

pub use bounded::*;
pub use bundle::*;
pub use derivation::*;
pub use normalizer::*;

use std::sync::Arc;
use std::time::Duration;

use ckd_care_model::ClassScores;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::models::{
    FeatureSnapshot, Language, Prediction, PredictionResult, Recommendation,
    RecommendationSource, StageLabel,
};
use crate::recommend::Recommender;
use crate::{CareError, CareResult};

/// Deadlines for the model collaborators. `None` runs the call inline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineTimeouts {
    pub classifier: Option<Duration>,
    pub explainer: Option<Duration>,
}

/// One prediction request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub patient_id: String,
    /// Clinician requesting on the patient's behalf
    #[serde(default)]
    pub clinician_id: Option<String>,
    pub input: ClinicalInput,
    /// Language for the recommendation's lifestyle tips
    #[serde(default)]
    pub language: Language,
}

impl PredictionRequest {
    pub fn new(patient_id: impl Into<String>, input: ClinicalInput) -> Self {
        Self {
            patient_id: patient_id.into(),
            clinician_id: None,
            input,
            language: Language::default(),
        }
    }

    pub fn by_clinician(mut self, clinician_id: impl Into<String>) -> Self {
        self.clinician_id = Some(clinician_id.into());
        self
    }

    pub fn in_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }
}

/// A non-fatal sub-step failure. The prediction was still made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PartialFailure {
    /// The model bundle has no explainer
    ExplainerMissing,
    /// The explainer returned an error or a malformed vector
    ExplainerFailed(String),
    /// The explainer did not answer within its deadline
    ExplainerTimedOut(Duration),
}

/// A committed prediction and the recommendation created with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub prediction: Prediction,
    pub recommendation: Recommendation,
    pub partial_failures: Vec<PartialFailure>,
}

impl PredictionOutcome {
    /// True when the prediction was stored without attribution.
    pub fn attribution_missing(&self) -> bool {
        self.prediction.attribution.is_none()
    }
}

/// A computed prediction not yet written to storage.
#[derive(Debug, Clone)]
pub struct PendingPrediction {
    prediction: Prediction,
    recommendation: Recommendation,
    partial_failures: Vec<PartialFailure>,
}

impl PendingPrediction {
    pub fn prediction(&self) -> &Prediction {
        &self.prediction
    }
}

/// The predict-and-record pipeline over one injected model bundle.
#[derive(Debug, Clone)]
pub struct PredictionPipeline {
    bundle: ModelBundle,
    recommender: Arc<Recommender>,
    timeouts: PipelineTimeouts,
}

impl PredictionPipeline {
    pub fn new(bundle: ModelBundle, recommender: Arc<Recommender>) -> Self {
        Self {
            bundle,
            recommender,
            timeouts: PipelineTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: PipelineTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    /// Run one prediction end to end on a database the caller holds for
    /// the whole call.
    pub fn run(&self, db: &Database, request: &PredictionRequest) -> CareResult<PredictionOutcome> {
        self.check_references(db, request)?;
        let pending = self.compute(request)?;
        self.commit(db, pending)
    }

    /// Fail with `NotFound` for an unknown patient or clinician.
    pub fn check_references(&self, db: &Database, request: &PredictionRequest) -> CareResult<()> {
        if !db.patient_exists(&request.patient_id)? {
            return Err(CareError::NotFound(format!(
                "patient {}",
                request.patient_id
            )));
        }
        if let Some(clinician_id) = &request.clinician_id {
            if !db.clinician_exists(clinician_id)? {
                return Err(CareError::NotFound(format!("clinician {}", clinician_id)));
            }
        }
        Ok(())
    }

    /// Model work only: normalize, scale, classify, derive, explain and
    /// resolve the plan. Touches no storage.
    pub fn compute(&self, request: &PredictionRequest) -> CareResult<PendingPrediction> {
        let values = self.bundle.normalizer().normalize(&request.input)?;
        let model_input = self.bundle.scale(&values)?;
        let scores = self.classify(&model_input)?;
        let result = self.derive(&values, &scores)?;

        let mut partial_failures = Vec::new();
        let attribution = match self.explain(&model_input) {
            Ok(weights) => Some(weights),
            Err(failure) => {
                warn!(
                    "Storing prediction for {} without attribution: {:?}",
                    request.patient_id, failure
                );
                partial_failures.push(failure);
                None
            }
        };

        let snapshot = FeatureSnapshot {
            names: self.bundle.contract().names().to_vec(),
            values,
            model_input,
        };
        let prediction = Prediction::new(
            request.patient_id.clone(),
            request.clinician_id.clone(),
            snapshot,
            result,
            attribution,
            self.bundle.classifier().name().to_string(),
        );

        let plan = self
            .recommender
            .resolve_stage(StageLabel::Ckd(result.ckd_stage), request.language);
        let recommendation = Recommendation::new(
            request.patient_id.clone(),
            StageLabel::Ckd(result.ckd_stage),
            plan.diet_plan,
            plan.exercise_plan,
            plan.lifestyle_tips,
            request.language,
            RecommendationSource::System,
        );

        Ok(PendingPrediction {
            prediction,
            recommendation,
            partial_failures,
        })
    }

    /// Write the prediction and its recommendation in one transaction.
    pub fn commit(&self, db: &Database, pending: PendingPrediction) -> CareResult<PredictionOutcome> {
        let PendingPrediction {
            prediction,
            recommendation,
            partial_failures,
        } = pending;

        let committed: CareResult<()> = db.in_transaction(|db| {
            db.insert_prediction(&prediction)?;
            db.insert_recommendation(&recommendation)?;
            Ok(())
        });
        if let Err(e) = committed {
            error!(
                "Prediction for {} rolled back: {}",
                prediction.patient_id, e
            );
            return Err(e);
        }

        info!(
            "Recorded {} ({}, risk {}) with {} for {}",
            prediction.prediction_id,
            prediction.result.ckd_stage,
            prediction.result.risk_level,
            recommendation.recommendation_id,
            prediction.patient_id
        );

        Ok(PredictionOutcome {
            prediction,
            recommendation,
            partial_failures,
        })
    }

    fn classify(&self, model_input: &[f64]) -> CareResult<ClassScores> {
        let classifier = Arc::clone(self.bundle.classifier());
        let features = model_input.to_vec();
        let scores = run_bounded("ckd-classifier", self.timeouts.classifier, move || {
            classifier.predict(&features)
        })
        .map_err(|e| CareError::ServiceUnavailable(format!("classifier {}", e)))?
        .map_err(|e| CareError::ServiceUnavailable(format!("classifier failed: {}", e)))?;

        scores
            .validate()
            .map_err(|e| CareError::ServiceUnavailable(format!("classifier output rejected: {}", e)))?;
        Ok(scores)
    }

    fn derive(&self, values: &[f64], scores: &ClassScores) -> CareResult<PredictionResult> {
        let (label, confidence) = scores.top().ok_or_else(|| {
            CareError::ServiceUnavailable("classifier returned no classes".into())
        })?;

        let idx = self.bundle.contract().filtration_rate_index();
        let filtration_rate = values.get(idx).copied().ok_or_else(|| {
            CareError::Configuration(format!(
                "feature vector of {} values has no position {}",
                values.len(),
                idx
            ))
        })?;

        Ok(PredictionResult {
            ckd_binary: label == self.bundle.positive_class(),
            ckd_stage: derive_stage(filtration_rate),
            confidence,
            risk_level: derive_risk(confidence),
        })
    }

    fn explain(&self, model_input: &[f64]) -> Result<Vec<f64>, PartialFailure> {
        let explainer = match self.bundle.explainer() {
            Some(explainer) => Arc::clone(explainer),
            None => return Err(PartialFailure::ExplainerMissing),
        };
        let features = model_input.to_vec();
        let expected = features.len();

        let weights = match run_bounded("ckd-explainer", self.timeouts.explainer, move || {
            explainer.attribute(&features)
        }) {
            Ok(Ok(weights)) => weights,
            Ok(Err(e)) => return Err(PartialFailure::ExplainerFailed(e.to_string())),
            Err(BoundedError::TimedOut(limit)) => {
                return Err(PartialFailure::ExplainerTimedOut(limit))
            }
            Err(e) => return Err(PartialFailure::ExplainerFailed(e.to_string())),
        };

        if weights.len() != expected || weights.iter().any(|w| !w.is_finite()) {
            return Err(PartialFailure::ExplainerFailed(format!(
                "expected {} finite weights, got {}",
                expected,
                weights.len()
            )));
        }
        Ok(weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CkdStage, Patient, RiskLevel};
    use ckd_care_model::{LogisticClassifier, ModelResult, Scaler, StandardScaler};

    struct Fixed(f64);

    impl ckd_care_model::Classifier for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn predict(&self, _features: &[f64]) -> ModelResult<ClassScores> {
            Ok(ClassScores {
                classes: vec!["No".into(), "Yes".into()],
                probabilities: vec![1.0 - self.0, self.0],
            })
        }
    }

    fn pipeline(p_yes: f64) -> PredictionPipeline {
        let scaler: Arc<dyn Scaler> = Arc::new(StandardScaler::identity(12));
        let bundle =
            ModelBundle::new(FeatureContract::canonical(), Arc::new(Fixed(p_yes)), scaler).unwrap();
        PredictionPipeline::new(bundle, Arc::new(Recommender::builtin().unwrap()))
    }

    fn setup_db() -> (Database, Patient) {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Meera".into(), "meera@example.com".into());
        db.insert_patient(&patient).unwrap();
        (db, patient)
    }

    fn input(egfr: &str) -> ClinicalInput {
        ClinicalInput {
            egfr: Some(egfr.into()),
            age: Some(58.0.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_stage_from_raw_filtration_rate() {
        let (db, patient) = setup_db();
        let outcome = pipeline(0.95)
            .run(&db, &PredictionRequest::new(&patient.patient_id, input("45")))
            .unwrap();
        let result = outcome.prediction.result;
        assert!(result.ckd_binary);
        assert_eq!(result.ckd_stage, CkdStage::Stage3);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(outcome.recommendation.stage, StageLabel::Ckd(CkdStage::Stage3));
        assert_eq!(outcome.partial_failures, vec![PartialFailure::ExplainerMissing]);
        assert!(outcome.attribution_missing());
    }

    #[test]
    fn test_confidence_is_top_probability() {
        let (db, patient) = setup_db();
        let outcome = pipeline(0.2)
            .run(&db, &PredictionRequest::new(&patient.patient_id, input("95")))
            .unwrap();
        let result = outcome.prediction.result;
        assert!(!result.ckd_binary);
        assert!((result.confidence - 0.8).abs() < 1e-12);
        assert_eq!(result.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_unknown_patient_is_not_found() {
        let (db, _) = setup_db();
        let err = pipeline(0.9)
            .run(&db, &PredictionRequest::new("PAT_missing", input("50")))
            .unwrap_err();
        assert!(matches!(err, CareError::NotFound(_)));
    }

    #[test]
    fn test_stage_uses_contract_position_of_filtration_rate() {
        let (db, patient) = setup_db();
        let contract =
            FeatureContract::new(vec!["eGFR".into(), "age".into(), "gender_M".into()]).unwrap();
        let bundle =
            ModelBundle::new(contract, Arc::new(Fixed(0.9)), Arc::new(StandardScaler::identity(2)))
                .unwrap();
        let outcome = PredictionPipeline::new(bundle, Arc::new(Recommender::builtin().unwrap()))
            .run(&db, &PredictionRequest::new(&patient.patient_id, input("20")))
            .unwrap();
        assert_eq!(outcome.prediction.result.ckd_stage, CkdStage::Stage4);
        assert_eq!(outcome.prediction.input.values, vec![20.0, 58.0, 0.0]);
    }

    #[test]
    fn test_compute_writes_nothing_until_commit() {
        let (db, patient) = setup_db();
        let pipeline = pipeline(0.95);
        let request = PredictionRequest::new(&patient.patient_id, input("45"));

        let pending = pipeline.compute(&request).unwrap();
        assert_eq!(pending.prediction().result.ckd_stage, CkdStage::Stage3);
        assert!(db.latest_prediction(&patient.patient_id).unwrap().is_none());

        let outcome = pipeline.commit(&db, pending).unwrap();
        let stored = db.latest_prediction(&patient.patient_id).unwrap().unwrap();
        assert_eq!(stored.prediction_id, outcome.prediction.prediction_id);
        assert_eq!(db.count_recommendations(&patient.patient_id).unwrap(), 1);
    }

    #[test]
    fn test_linear_explainer_attribution_is_stored() {
        let (db, patient) = setup_db();
        let classifier = LogisticClassifier {
            model_name: "lin".into(),
            weights: vec![0.1; 13],
            bias: 0.0,
            classes: ["No".into(), "Yes".into()],
        };
        let explainer = ckd_care_model::LinearExplainer::for_classifier(&classifier, vec![0.0; 13]).unwrap();
        let bundle = ModelBundle::new(
            FeatureContract::canonical(),
            Arc::new(classifier),
            Arc::new(StandardScaler::identity(12)),
        )
        .unwrap()
        .with_explainer(Arc::new(explainer));
        let pipeline = PredictionPipeline::new(bundle, Arc::new(Recommender::builtin().unwrap()));

        let outcome = pipeline
            .run(&db, &PredictionRequest::new(&patient.patient_id, input("70")))
            .unwrap();
        assert!(outcome.partial_failures.is_empty());
        let named = outcome.prediction.named_attribution().unwrap();
        let egfr = named.iter().find(|(name, _)| name == "eGFR").unwrap();
        assert!((egfr.1 - 7.0).abs() < 1e-9);
    }
}
