//! Prediction pipeline integration tests.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ckd_care_core::db::{Database, PredictionFilter};
use ckd_care_core::models::{CkdStage, Gender, HealthStatus, Language, RiskLevel, StageLabel};
use ckd_care_core::predict::PipelineTimeouts;
use ckd_care_core::{
    CareConfig, CareError, CkdCare, ClinicalInput, FilterParams, PageRequest, PartialFailure,
    PredictionPipeline, PredictionRequest, Recommender,
};
use common::*;

#[test]
fn test_stage_three_high_risk() {
    let care = care_with(bundle(0.95));
    let patient = register(&care, "Asha Rao", "asha@example.com", Some(Gender::F));

    let outcome = care
        .predict(&PredictionRequest::new(&patient.patient_id, clinical(45.0)))
        .unwrap();

    let result = outcome.prediction.result;
    assert!(result.ckd_binary);
    assert_eq!(result.ckd_stage, CkdStage::Stage3);
    assert!((result.confidence - 0.95).abs() < 1e-12);
    assert_eq!(result.risk_level, RiskLevel::High);

    let plan = care.resolve_recommendation("Stage 3", Language::English);
    assert_eq!(outcome.recommendation.stage, StageLabel::Ckd(CkdStage::Stage3));
    assert_eq!(outcome.recommendation.diet_plan, plan.diet_plan);
    assert_eq!(outcome.recommendation.exercise_plan, plan.exercise_plan);

    let latest = care
        .latest_recommendation(&patient.patient_id)
        .unwrap()
        .unwrap();
    assert_eq!(latest.recommendation_id, outcome.recommendation.recommendation_id);

    let stored = care.get_prediction(&outcome.prediction.prediction_id).unwrap();
    assert_eq!(stored.result, result);
    assert_eq!(stored.input, outcome.prediction.input);
}

#[test]
fn test_negative_flag_stage_one_low_risk() {
    let care = care_with(bundle(0.4));
    let patient = register(&care, "Ravi Kumar", "ravi@example.com", Some(Gender::M));

    let outcome = care
        .predict(&PredictionRequest::new(&patient.patient_id, clinical(95.0)))
        .unwrap();

    let result = outcome.prediction.result;
    assert!(!result.ckd_binary);
    assert_eq!(result.ckd_stage, CkdStage::Stage1);
    assert!((result.confidence - 0.6).abs() < 1e-12);
    assert_eq!(result.risk_level, RiskLevel::Low);

    // Status comes from the binary flag, not the stage
    let page = care
        .query_patients(&FilterParams::default(), PageRequest::default())
        .unwrap();
    assert_eq!(page.items[0].health_status, HealthStatus::Healthy);
    assert_eq!(page.items[0].risk_level, Some(RiskLevel::Low));
}

#[test]
fn test_kannada_tips() {
    let care = care_with(bundle(0.95));
    let patient = register(&care, "Lakshmi", "lakshmi@example.com", None);

    let outcome = care
        .predict(
            &PredictionRequest::new(&patient.patient_id, clinical(20.0))
                .in_language(Language::Kannada),
        )
        .unwrap();

    assert_eq!(outcome.prediction.result.ckd_stage, CkdStage::Stage4);
    assert_eq!(outcome.recommendation.language, Language::Kannada);
    assert_eq!(
        outcome.recommendation.lifestyle_tips,
        care.resolve_recommendation("Stage 4", Language::Kannada).lifestyle_tips
    );
}

#[test]
fn test_invalid_input_writes_nothing() {
    let care = care_with(bundle(0.95));
    let patient = register(&care, "Asha Rao", "asha@example.com", None);

    let input = ClinicalInput {
        egfr: Some("forty".into()),
        ..Default::default()
    };
    let err = care
        .predict(&PredictionRequest::new(&patient.patient_id, input))
        .unwrap_err();
    assert!(matches!(err, CareError::Validation(_)));

    let detail = care.patient_detail(&patient.patient_id).unwrap();
    assert!(detail.recent_predictions.is_empty());
    assert!(detail.latest_recommendation.is_none());
}

#[test]
fn test_unknown_input_key_rejected() {
    assert!(ClinicalInput::from_json(r#"{ "egfr": 45, "colour": "red" }"#).is_err());
    let parsed = ClinicalInput::from_json(r#"{ "egfr": "45", "age": 61 }"#).unwrap();
    assert_eq!(parsed.egfr, Some("45".into()));
}

#[test]
fn test_unknown_clinician_is_not_found() {
    let care = care_with(bundle(0.95));
    let patient = register(&care, "Asha Rao", "asha@example.com", None);

    let err = care
        .predict(&PredictionRequest::new(&patient.patient_id, clinical(45.0)).by_clinician("DOC_missing"))
        .unwrap_err();
    assert!(matches!(err, CareError::NotFound(_)));
}

#[test]
fn test_classifier_failure_is_unavailable_and_writes_nothing() {
    let care = care_with(bundle_with(Arc::new(BrokenClassifier)));
    let patient = register(&care, "Asha Rao", "asha@example.com", None);

    let err = care
        .predict(&PredictionRequest::new(&patient.patient_id, clinical(45.0)))
        .unwrap_err();
    assert!(matches!(err, CareError::ServiceUnavailable(_)));
    assert!(care.trends(&patient.patient_id).unwrap().is_empty());
}

#[test]
fn test_recommendation_failure_rolls_back_prediction() {
    init_logging();
    let db = Database::open_in_memory().unwrap();
    let patient = ckd_care_core::Patient::new("Asha Rao".into(), "asha@example.com".into());
    db.insert_patient(&patient).unwrap();
    db.conn()
        .execute_batch(
            r#"
            CREATE TRIGGER reject_recommendations BEFORE INSERT ON recommendations
            BEGIN
                SELECT RAISE(ABORT, 'recommendation store offline');
            END;
            "#,
        )
        .unwrap();

    let pipeline = PredictionPipeline::new(bundle(0.95), Arc::new(Recommender::builtin().unwrap()));
    assert!(pipeline
        .run(&db, &PredictionRequest::new(&patient.patient_id, clinical(45.0)))
        .is_err());

    assert_eq!(db.count_predictions(&PredictionFilter::default()).unwrap(), 0);
    assert_eq!(db.count_recommendations(&patient.patient_id).unwrap(), 0);
}

#[test]
fn test_explainer_timeout_is_partial_failure() {
    init_logging();
    let slow = bundle(0.95).with_explainer(Arc::new(SlowExplainer {
        delay: Duration::from_millis(500),
    }));
    let config = CareConfig {
        explainer_timeout_ms: Some(20),
        ..Default::default()
    };
    let care = CkdCare::in_memory(Some(slow), config).unwrap();
    let patient = register(&care, "Asha Rao", "asha@example.com", None);

    let outcome = care
        .predict(&PredictionRequest::new(&patient.patient_id, clinical(45.0)))
        .unwrap();

    assert_eq!(
        outcome.partial_failures,
        vec![PartialFailure::ExplainerTimedOut(Duration::from_millis(20))]
    );
    assert!(outcome.prediction.attribution.is_none());
    assert!(care.get_prediction(&outcome.prediction.prediction_id).is_ok());
    assert!(matches!(
        care.attribution_summary(&patient.patient_id),
        Err(CareError::NotFound(_))
    ));
}

#[test]
fn test_explainer_error_is_partial_failure() {
    init_logging();
    let db = Database::open_in_memory().unwrap();
    let patient = ckd_care_core::Patient::new("Asha Rao".into(), "asha@example.com".into());
    db.insert_patient(&patient).unwrap();

    let pipeline = PredictionPipeline::new(
        bundle(0.95).with_explainer(Arc::new(FailingExplainer)),
        Arc::new(Recommender::builtin().unwrap()),
    )
    .with_timeouts(PipelineTimeouts::default());

    let outcome = pipeline
        .run(&db, &PredictionRequest::new(&patient.patient_id, clinical(45.0)))
        .unwrap();
    assert!(matches!(
        outcome.partial_failures.as_slice(),
        [PartialFailure::ExplainerFailed(_)]
    ));
    assert_eq!(db.count_predictions(&PredictionFilter::default()).unwrap(), 1);
}

#[test]
fn test_snapshot_reproduces_labels() {
    let care = care_with(bundle(0.72));
    let patient = register(&care, "Asha Rao", "asha@example.com", None);

    let outcome = care
        .predict(&PredictionRequest::new(&patient.patient_id, clinical(52.5)))
        .unwrap();
    let mut stored = care.get_prediction(&outcome.prediction.prediction_id).unwrap();

    assert!(stored.verify_snapshot());
    assert_eq!(stored.input.get("eGFR"), Some(52.5));
    assert_eq!(
        stored.rederive(),
        (stored.result.ckd_stage, stored.result.risk_level)
    );
    assert_eq!(stored.rederive(), (CkdStage::Stage3, RiskLevel::Medium));

    stored.input.values[9] = 10.0;
    assert!(!stored.verify_snapshot());
}

#[test]
fn test_concurrent_predictions_are_all_recorded() {
    let care = Arc::new(care_with(bundle(0.95)));
    let patient = register(&care, "Asha Rao", "asha@example.com", None);

    let handles: Vec<_> = [95.0, 70.0, 40.0, 20.0]
        .into_iter()
        .map(|egfr| {
            let care = Arc::clone(&care);
            let patient_id = patient.patient_id.clone();
            thread::spawn(move || {
                care.predict(&PredictionRequest::new(patient_id, clinical(egfr)))
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let trends = care.trends(&patient.patient_id).unwrap();
    assert_eq!(trends.len(), 4);
    assert!(trends.windows(2).all(|w| w[0].date <= w[1].date));
}

#[test]
fn test_queries_proceed_while_explainer_runs() {
    let slow = bundle(0.95).with_explainer(Arc::new(SlowExplainer {
        delay: Duration::from_millis(1500),
    }));
    let care = Arc::new(care_with(slow));
    let patient = register(&care, "Asha Rao", "asha@example.com", None);

    let predicting = {
        let care = Arc::clone(&care);
        let patient_id = patient.patient_id.clone();
        thread::spawn(move || {
            care.predict(&PredictionRequest::new(patient_id, clinical(45.0)))
                .unwrap()
        })
    };
    thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    let page = care
        .query_patients(&FilterParams::default(), PageRequest::default())
        .unwrap();
    let waited = started.elapsed();

    assert_eq!(page.total_count, 1);
    assert!(waited < Duration::from_millis(700), "query waited {:?}", waited);

    let outcome = predicting.join().unwrap();
    assert!(outcome.partial_failures.is_empty());
    assert!(outcome.prediction.attribution.is_some());
    assert_eq!(care.trends(&patient.patient_id).unwrap().len(), 1);
}
