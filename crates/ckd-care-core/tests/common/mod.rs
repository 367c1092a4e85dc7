//! Shared fixtures: scripted model collaborators and a facade over an
//! in-memory database.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ckd_care_core::models::{Gender, Patient, ProfileUpdate};
use ckd_care_core::predict::FeatureContract;
use ckd_care_core::registry::PatientRegistration;
use ckd_care_core::{CareConfig, CkdCare, ClinicalInput, ModelBundle};
use ckd_care_model::{ClassScores, Classifier, Explainer, ModelError, ModelResult, StandardScaler};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Always answers with the same probability of CKD.
pub struct FixedClassifier {
    pub p_yes: f64,
}

impl Classifier for FixedClassifier {
    fn name(&self) -> &str {
        "fixed-test-classifier"
    }

    fn predict(&self, _features: &[f64]) -> ModelResult<ClassScores> {
        Ok(ClassScores {
            classes: vec!["No".into(), "Yes".into()],
            probabilities: vec![1.0 - self.p_yes, self.p_yes],
        })
    }
}

pub struct BrokenClassifier;

impl Classifier for BrokenClassifier {
    fn name(&self) -> &str {
        "broken"
    }

    fn predict(&self, _features: &[f64]) -> ModelResult<ClassScores> {
        Err(ModelError::Inference("model runtime unreachable".into()))
    }
}

/// Returns zero weights after a delay.
pub struct SlowExplainer {
    pub delay: Duration,
}

impl Explainer for SlowExplainer {
    fn attribute(&self, features: &[f64]) -> ModelResult<Vec<f64>> {
        thread::sleep(self.delay);
        Ok(vec![0.0; features.len()])
    }
}

pub struct FailingExplainer;

impl Explainer for FailingExplainer {
    fn attribute(&self, _features: &[f64]) -> ModelResult<Vec<f64>> {
        Err(ModelError::Inference("explainer crashed".into()))
    }
}

pub fn bundle_with(classifier: Arc<dyn Classifier>) -> ModelBundle {
    ModelBundle::new(
        FeatureContract::canonical(),
        classifier,
        Arc::new(StandardScaler::identity(12)),
    )
    .unwrap()
}

pub fn bundle(p_yes: f64) -> ModelBundle {
    bundle_with(Arc::new(FixedClassifier { p_yes }))
}

pub fn care_with(bundle: ModelBundle) -> CkdCare {
    init_logging();
    CkdCare::in_memory(Some(bundle), CareConfig::default()).unwrap()
}

pub fn register(care: &CkdCare, name: &str, email: &str, gender: Option<Gender>) -> Patient {
    care.register_patient(&PatientRegistration {
        name: name.to_string(),
        email: email.to_string(),
        profile: ProfileUpdate {
            gender,
            ..Default::default()
        },
    })
    .unwrap()
}

/// Typical lab panel with the given filtration rate.
pub fn clinical(egfr: f64) -> ClinicalInput {
    ClinicalInput {
        age: Some(58.0.into()),
        blood_pressure: Some(140.0.into()),
        serum_creatinine: Some(1.8.into()),
        bun: Some(32.0.into()),
        acr: Some(120.0.into()),
        egfr: Some(egfr.into()),
        gender: Some("F".into()),
        ..Default::default()
    }
}
