//! Analytics aggregator over stored predictions.
//!
//! Prediction-derived metrics honour the date and stage filters; the
//! patient total never does. The model evaluation block is static
//! metadata from the classifier's offline evaluation, copied from
//! configuration, and is not computed from live data.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::db::{Database, PredictionFilter};
use crate::models::{CkdStage, Prediction, RiskLevel};
use crate::query::date_bound;
use crate::{CareError, CareResult};

/// Offline confusion matrix of the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: u64,
    pub false_positive: u64,
    pub false_negative: u64,
    pub true_positive: u64,
}

/// Offline evaluation snapshot reported alongside live analytics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelEvaluation {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub confusion_matrix: ConfusionMatrix,
}

impl Default for ModelEvaluation {
    fn default() -> Self {
        Self {
            accuracy: 0.9808,
            precision: 0.9756,
            recall: 0.9823,
            f1_score: 0.9789,
            confusion_matrix: ConfusionMatrix {
                true_negative: 2456,
                false_positive: 23,
                false_negative: 18,
                true_positive: 2503,
            },
        }
    }
}

impl Default for ConfusionMatrix {
    fn default() -> Self {
        ModelEvaluation::default().confusion_matrix
    }
}

/// Raw analytics filters as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsFilter {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    /// "Stage 1".."Stage 5", or "all"/blank for every stage
    pub stage: Option<String>,
}

impl AnalyticsFilter {
    /// Resolve into a prediction filter. Unparseable dates are dropped;
    /// an unknown stage is a validation error.
    pub fn resolve(&self) -> CareResult<PredictionFilter> {
        let stage = match self.stage.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(s.parse::<CkdStage>()?),
        };
        Ok(PredictionFilter {
            created_from: date_bound("date_from", self.date_from.as_deref()),
            created_to: date_bound("date_to", self.date_to.as_deref()),
            stage,
            ckd_binary: None,
        })
    }
}

/// Dashboard analytics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    /// All registered patients, unfiltered
    pub total_patients: u64,
    /// Filtered predictions with a positive flag
    pub ckd_positive: u64,
    /// Filtered predictions with a negative flag
    pub ckd_negative: u64,
    pub total_predictions: u64,
    pub by_stage: BTreeMap<CkdStage, u64>,
    pub by_risk: BTreeMap<RiskLevel, u64>,
    /// Newest filtered predictions
    pub recent: Vec<Prediction>,
    /// Static offline evaluation, not derived from `recent` or the counts
    pub model_evaluation: ModelEvaluation,
    /// The filter actually applied, after dropping unparseable bounds
    pub applied: PredictionFilter,
}

/// Analytics over one database.
pub struct Analytics<'a> {
    db: &'a Database,
    evaluation: ModelEvaluation,
    recent_limit: usize,
}

impl<'a> Analytics<'a> {
    pub fn new(db: &'a Database, evaluation: ModelEvaluation, recent_limit: usize) -> Self {
        Self {
            db,
            evaluation,
            recent_limit,
        }
    }

    /// Compute the report for raw caller filters.
    pub fn report(&self, filter: &AnalyticsFilter) -> CareResult<AnalyticsReport> {
        let applied = filter.resolve()?;
        self.report_for(applied)
    }

    /// Compute the report for an already resolved filter.
    pub fn report_for(&self, applied: PredictionFilter) -> CareResult<AnalyticsReport> {
        let (ckd_positive, ckd_negative) = self.db.count_predictions_by_flag(&applied)?;
        let report = AnalyticsReport {
            total_patients: self.db.count_patients()?,
            ckd_positive,
            ckd_negative,
            total_predictions: self.db.count_predictions(&applied)?,
            by_stage: self
                .db
                .count_predictions_by_stage(&applied)?
                .into_iter()
                .collect(),
            by_risk: self
                .db
                .count_predictions_by_risk(&applied)?
                .into_iter()
                .collect(),
            recent: self.db.recent_predictions(&applied, self.recent_limit)?,
            model_evaluation: self.evaluation,
            applied,
        };
        debug!(
            "Analytics over {} predictions ({} positive, {} negative)",
            report.total_predictions, report.ckd_positive, report.ckd_negative
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureSnapshot, Patient, PredictionResult};

    fn setup_db() -> (Database, Patient) {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Lakshmi".into(), "lakshmi@example.com".into());
        db.insert_patient(&patient).unwrap();
        (db, patient)
    }

    fn record(db: &Database, patient: &Patient, ckd: bool, stage: CkdStage, risk: RiskLevel) {
        let prediction = Prediction::new(
            patient.patient_id.clone(),
            None,
            FeatureSnapshot {
                names: vec!["eGFR".into()],
                values: vec![40.0],
                model_input: vec![40.0],
            },
            PredictionResult {
                ckd_binary: ckd,
                ckd_stage: stage,
                confidence: 0.75,
                risk_level: risk,
            },
            None,
            "test".into(),
        );
        db.insert_prediction(&prediction).unwrap();
    }

    #[test]
    fn test_default_evaluation_snapshot() {
        let eval = ModelEvaluation::default();
        assert_eq!(eval.accuracy, 0.9808);
        assert_eq!(eval.confusion_matrix.true_positive, 2503);
        assert_eq!(eval.confusion_matrix.false_negative, 18);
    }

    #[test]
    fn test_stage_filter_values() {
        let stage = |s: &str| AnalyticsFilter {
            stage: Some(s.into()),
            ..Default::default()
        };
        assert_eq!(stage("all").resolve().unwrap().stage, None);
        assert_eq!(stage("").resolve().unwrap().stage, None);
        assert_eq!(stage("Stage 2").resolve().unwrap().stage, Some(CkdStage::Stage2));
        assert!(matches!(
            stage("No CKD").resolve(),
            Err(CareError::Validation(_))
        ));
    }

    #[test]
    fn test_counts_and_groupings() {
        let (db, patient) = setup_db();
        record(&db, &patient, true, CkdStage::Stage3, RiskLevel::Medium);
        record(&db, &patient, true, CkdStage::Stage3, RiskLevel::High);
        record(&db, &patient, false, CkdStage::Stage1, RiskLevel::Low);

        let analytics = Analytics::new(&db, ModelEvaluation::default(), 2);
        let report = analytics.report(&AnalyticsFilter::default()).unwrap();
        assert_eq!(report.total_patients, 1);
        assert_eq!(report.total_predictions, 3);
        assert_eq!((report.ckd_positive, report.ckd_negative), (2, 1));
        assert_eq!(report.by_stage.get(&CkdStage::Stage3), Some(&2));
        assert_eq!(report.by_risk.get(&RiskLevel::Low), Some(&1));
        assert_eq!(report.recent.len(), 2);

        let stage3 = analytics
            .report(&AnalyticsFilter {
                stage: Some("Stage 3".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(stage3.total_predictions, 2);
        assert_eq!(stage3.ckd_negative, 0);
        assert_eq!(stage3.total_patients, 1);
    }

    #[test]
    fn test_date_bounds_filter_predictions_only() {
        let (db, patient) = setup_db();
        record(&db, &patient, true, CkdStage::Stage4, RiskLevel::High);

        let report = Analytics::new(&db, ModelEvaluation::default(), 10)
            .report(&AnalyticsFilter {
                date_to: Some("2000-01-01".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(report.total_predictions, 0);
        assert!(report.by_stage.is_empty());
        assert_eq!(report.total_patients, 1);
    }
}
