//! Clinician views over one patient's history: detail, trends, attribution
//! summary, prediction comparison, plus the registry-wide data quality check.
//!
//! Everything here reads stored snapshots only; nothing is recomputed from
//! the live feature contract.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::Database;
use crate::models::{CkdStage, Patient, Prediction, PredictionResult, Recommendation, RiskLevel};
use crate::predict::FILTRATION_RATE_FEATURE;
use crate::{CareError, CareResult};

/// Predictions shown on the patient detail view.
pub const DETAIL_PREDICTION_LIMIT: usize = 5;

/// Features listed in an attribution summary.
pub const ATTRIBUTION_TOP_N: usize = 10;

/// Snapshot features tracked over time and compared between predictions.
pub const TRACKED_FEATURES: [&str; 5] = [
    FILTRATION_RATE_FEATURE,
    "Blood_Pressure",
    "ACR",
    "Serum_Creatinine",
    "BUN",
];

// =========================================================================
// Patient detail
// =========================================================================

/// A patient with recent predictions and the current recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientDetail {
    pub patient: Patient,
    /// Newest first
    pub recent_predictions: Vec<Prediction>,
    pub latest_recommendation: Option<Recommendation>,
}

// =========================================================================
// Trends
// =========================================================================

/// One point of a patient's lab trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub prediction_id: String,
    pub date: DateTime<Utc>,
    pub egfr: f64,
    pub blood_pressure: f64,
    pub acr: f64,
    pub serum_creatinine: f64,
    pub bun: f64,
    pub ckd_stage: CkdStage,
    pub risk_level: RiskLevel,
}

impl From<&Prediction> for TrendPoint {
    fn from(p: &Prediction) -> Self {
        let value = |name: &str| p.input.get(name).unwrap_or(0.0);
        Self {
            prediction_id: p.prediction_id.clone(),
            date: p.created_at,
            egfr: value(FILTRATION_RATE_FEATURE),
            blood_pressure: value("Blood_Pressure"),
            acr: value("ACR"),
            serum_creatinine: value("Serum_Creatinine"),
            bun: value("BUN"),
            ckd_stage: p.result.ckd_stage,
            risk_level: p.result.risk_level,
        }
    }
}

// =========================================================================
// Attribution summary
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
    pub abs_importance: f64,
}

/// Largest attributions of the latest prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributionSummary {
    pub prediction_id: String,
    /// Sorted by absolute weight, largest first
    pub features: Vec<FeatureImportance>,
    pub result: PredictionResult,
}

// =========================================================================
// Prediction comparison
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureChange {
    pub feature: String,
    pub value_1: f64,
    pub value_2: f64,
    pub change: f64,
    /// Percent of `value_1`, two decimals; 0 when `value_1` is 0
    pub change_percentage: f64,
}

impl FeatureChange {
    fn between(feature: &str, value_1: f64, value_2: f64) -> Self {
        let change = value_2 - value_1;
        let change_percentage = if value_1 == 0.0 {
            0.0
        } else {
            round2(change / value_1 * 100.0)
        };
        Self {
            feature: feature.to_string(),
            value_1,
            value_2,
            change,
            change_percentage,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Two predictions of one patient side by side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionComparison {
    pub first: Prediction,
    pub second: Prediction,
    /// Tracked features present in both snapshots
    pub changes: Vec<FeatureChange>,
}

// =========================================================================
// Data quality
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    fn for_issue_count(count: usize) -> Self {
        match count {
            n if n >= 3 => Severity::High,
            2 => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityIssue {
    pub patient_id: String,
    pub name: String,
    pub email: String,
    /// e.g. "Missing age"
    pub issues: Vec<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQualityReport {
    pub total_patients: u64,
    pub patients_with_issues: u64,
    pub quality_issues: Vec<QualityIssue>,
}

// =========================================================================
// Queries
// =========================================================================

/// Read-only clinician views over one database.
pub struct Insights<'a> {
    db: &'a Database,
}

impl<'a> Insights<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn require_patient(&self, patient_id: &str) -> CareResult<Patient> {
        self.db
            .get_patient(patient_id)?
            .ok_or_else(|| CareError::NotFound(format!("patient {}", patient_id)))
    }

    /// Patient plus the five newest predictions and latest recommendation.
    pub fn patient_detail(&self, patient_id: &str) -> CareResult<PatientDetail> {
        let patient = self.require_patient(patient_id)?;
        Ok(PatientDetail {
            recent_predictions: self
                .db
                .recent_predictions_for_patient(patient_id, DETAIL_PREDICTION_LIMIT)?,
            latest_recommendation: self.db.latest_recommendation(patient_id)?,
            patient,
        })
    }

    /// Chronological lab series from stored snapshots.
    pub fn trends(&self, patient_id: &str) -> CareResult<Vec<TrendPoint>> {
        self.require_patient(patient_id)?;
        Ok(self
            .db
            .prediction_history(patient_id)?
            .iter()
            .map(TrendPoint::from)
            .collect())
    }

    /// Top attributions of the latest prediction, named from its snapshot.
    pub fn attribution_summary(&self, patient_id: &str) -> CareResult<AttributionSummary> {
        self.require_patient(patient_id)?;
        let latest = self
            .db
            .latest_prediction(patient_id)?
            .ok_or_else(|| CareError::NotFound(format!("predictions for {}", patient_id)))?;
        let named = latest.named_attribution().ok_or_else(|| {
            CareError::NotFound(format!("attribution for {}", latest.prediction_id))
        })?;

        let mut features: Vec<FeatureImportance> = named
            .into_iter()
            .map(|(feature, importance)| FeatureImportance {
                feature,
                importance,
                abs_importance: importance.abs(),
            })
            .collect();
        // Stable sort keeps contract order among equal weights
        features.sort_by(|a, b| b.abs_importance.total_cmp(&a.abs_importance));
        features.truncate(ATTRIBUTION_TOP_N);

        Ok(AttributionSummary {
            prediction_id: latest.prediction_id,
            features,
            result: latest.result,
        })
    }

    /// Compare two predictions of the same patient.
    pub fn compare_predictions(
        &self,
        patient_id: &str,
        first_id: &str,
        second_id: &str,
    ) -> CareResult<PredictionComparison> {
        let fetch = |prediction_id: &str| -> CareResult<Prediction> {
            self.db
                .get_prediction(prediction_id)?
                .filter(|p| p.patient_id == patient_id)
                .ok_or_else(|| {
                    CareError::NotFound(format!(
                        "prediction {} for patient {}",
                        prediction_id, patient_id
                    ))
                })
        };
        let first = fetch(first_id)?;
        let second = fetch(second_id)?;

        let changes = TRACKED_FEATURES
            .iter()
            .filter_map(|feature| {
                let a = first.input.get(feature)?;
                let b = second.input.get(feature)?;
                Some(FeatureChange::between(feature, a, b))
            })
            .collect();

        Ok(PredictionComparison {
            first,
            second,
            changes,
        })
    }

    /// Patients with incomplete profiles.
    pub fn data_quality(&self) -> CareResult<DataQualityReport> {
        let patients = self.db.list_patients()?;
        let quality_issues: Vec<QualityIssue> = patients
            .iter()
            .filter_map(|patient| {
                let missing = patient.missing_profile_fields();
                if missing.is_empty() {
                    return None;
                }
                Some(QualityIssue {
                    patient_id: patient.patient_id.clone(),
                    name: patient.name.clone(),
                    email: patient.email.clone(),
                    severity: Severity::for_issue_count(missing.len()),
                    issues: missing.iter().map(|f| format!("Missing {}", f)).collect(),
                })
            })
            .collect();

        Ok(DataQualityReport {
            total_patients: patients.len() as u64,
            patients_with_issues: quality_issues.len() as u64,
            quality_issues,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureSnapshot, Gender};

    fn setup_db() -> (Database, Patient) {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Kavya".into(), "kavya@example.com".into());
        db.insert_patient(&patient).unwrap();
        (db, patient)
    }

    fn record(db: &Database, patient_id: &str, egfr: f64, bp: f64, attribution: Option<Vec<f64>>) -> Prediction {
        let prediction = Prediction::new(
            patient_id.into(),
            None,
            FeatureSnapshot {
                names: vec!["eGFR".into(), "Blood_Pressure".into(), "age".into()],
                values: vec![egfr, bp, 60.0],
                model_input: vec![egfr, bp, 60.0],
            },
            PredictionResult {
                ckd_binary: true,
                ckd_stage: crate::predict::derive_stage(egfr),
                confidence: 0.92,
                risk_level: RiskLevel::High,
            },
            attribution,
            "test".into(),
        );
        db.insert_prediction(&prediction).unwrap();
        prediction
    }

    #[test]
    fn test_detail_caps_predictions() {
        let (db, patient) = setup_db();
        for i in 0..7 {
            record(&db, &patient.patient_id, 50.0 + i as f64, 120.0, None);
        }
        let detail = Insights::new(&db).patient_detail(&patient.patient_id).unwrap();
        assert_eq!(detail.recent_predictions.len(), DETAIL_PREDICTION_LIMIT);
        assert_eq!(detail.recent_predictions[0].input.get("eGFR"), Some(56.0));
        assert!(detail.latest_recommendation.is_none());

        assert!(matches!(
            Insights::new(&db).patient_detail("PAT_missing"),
            Err(CareError::NotFound(_))
        ));
    }

    #[test]
    fn test_trends_are_chronological_with_missing_as_zero() {
        let (db, patient) = setup_db();
        record(&db, &patient.patient_id, 70.0, 130.0, None);
        record(&db, &patient.patient_id, 40.0, 140.0, None);
        let trends = Insights::new(&db).trends(&patient.patient_id).unwrap();
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].egfr, 70.0);
        assert_eq!(trends[1].ckd_stage, CkdStage::Stage3);
        assert_eq!(trends[1].acr, 0.0);
    }

    #[test]
    fn test_attribution_summary_sorted_by_magnitude() {
        let (db, patient) = setup_db();
        record(&db, &patient.patient_id, 40.0, 140.0, Some(vec![0.1, -0.7, 0.3]));
        let summary = Insights::new(&db).attribution_summary(&patient.patient_id).unwrap();
        let order: Vec<&str> = summary.features.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(order, vec!["Blood_Pressure", "age", "eGFR"]);
        assert_eq!(summary.features[0].importance, -0.7);
        assert_eq!(summary.features[0].abs_importance, 0.7);
    }

    #[test]
    fn test_attribution_summary_not_found_cases() {
        let (db, patient) = setup_db();
        let insights = Insights::new(&db);
        assert!(matches!(
            insights.attribution_summary(&patient.patient_id),
            Err(CareError::NotFound(_))
        ));
        record(&db, &patient.patient_id, 40.0, 140.0, None);
        assert!(matches!(
            insights.attribution_summary(&patient.patient_id),
            Err(CareError::NotFound(_))
        ));
    }

    #[test]
    fn test_compare_predictions() {
        let (db, patient) = setup_db();
        let a = record(&db, &patient.patient_id, 50.0, 0.0, None);
        let b = record(&db, &patient.patient_id, 45.0, 120.0, None);
        let cmp = Insights::new(&db)
            .compare_predictions(&patient.patient_id, &a.prediction_id, &b.prediction_id)
            .unwrap();
        assert_eq!(cmp.changes.len(), 2);
        assert_eq!(cmp.changes[0].feature, "eGFR");
        assert_eq!(cmp.changes[0].change, -5.0);
        assert_eq!(cmp.changes[0].change_percentage, -10.0);
        assert_eq!(cmp.changes[1].change_percentage, 0.0);
    }

    #[test]
    fn test_compare_rejects_other_patients_prediction() {
        let (db, patient) = setup_db();
        let other = Patient::new("Other".into(), "other@example.com".into());
        db.insert_patient(&other).unwrap();
        let mine = record(&db, &patient.patient_id, 50.0, 120.0, None);
        let theirs = record(&db, &other.patient_id, 50.0, 120.0, None);
        assert!(matches!(
            Insights::new(&db).compare_predictions(
                &patient.patient_id,
                &mine.prediction_id,
                &theirs.prediction_id
            ),
            Err(CareError::NotFound(_))
        ));
    }

    #[test]
    fn test_change_percentage_rounding() {
        let change = FeatureChange::between("BUN", 3.0, 4.0);
        assert_eq!(change.change_percentage, 33.33);
    }

    #[test]
    fn test_data_quality_severity() {
        let (db, bare) = setup_db();
        let mut partial = Patient::new("Partial".into(), "partial@example.com".into());
        partial.age = Some(44);
        partial.gender = Some(Gender::M);
        db.insert_patient(&partial).unwrap();
        let mut complete = Patient::new("Full".into(), "full@example.com".into());
        complete.age = Some(30);
        complete.gender = Some(Gender::F);
        complete.phone = Some("555-0100".into());
        complete.address = Some("12 Lake Road".into());
        db.insert_patient(&complete).unwrap();

        let report = Insights::new(&db).data_quality().unwrap();
        assert_eq!(report.total_patients, 3);
        assert_eq!(report.patients_with_issues, 2);
        let severity_of = |id: &str| {
            report
                .quality_issues
                .iter()
                .find(|i| i.patient_id == id)
                .map(|i| i.severity)
        };
        assert_eq!(severity_of(&bare.patient_id), Some(Severity::High));
        assert_eq!(severity_of(&partial.patient_id), Some(Severity::Medium));
        assert_eq!(severity_of(&complete.patient_id), None);
    }
}
