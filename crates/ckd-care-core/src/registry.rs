//! Patient and clinician records: registration, profile edits, tags,
//! clinician assignment and clinician-authored recommendations.

use std::collections::BTreeSet;

use log::info;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::models::{
    is_valid_email, now, Clinician, Language, Patient, ProfileUpdate, Recommendation,
    RecommendationSource, StageLabel,
};
use crate::recommend::Recommender;
use crate::{CareError, CareResult};

/// New patient registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientRegistration {
    pub name: String,
    pub email: String,
    /// Optional profile fields set at registration
    pub profile: ProfileUpdate,
}

/// New clinician registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicianRegistration {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub specialization: Option<String>,
}

/// Per-patient result of a bulk action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkItemResult {
    pub patient_id: String,
    pub success: bool,
    pub message: String,
}

/// Summary of a bulk action. Failures are per item; the batch never aborts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResult>,
}

impl BulkOutcome {
    pub(crate) fn from_results(results: Vec<BulkItemResult>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            processed: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }
}

fn validate_identity(name: &str, email: &str) -> CareResult<(String, String)> {
    let name = name.trim();
    let email = email.trim();
    if name.is_empty() {
        return Err(CareError::Validation("name is required".into()));
    }
    if !is_valid_email(email) {
        return Err(CareError::Validation(format!("invalid email: {:?}", email)));
    }
    Ok((name.to_string(), email.to_string()))
}

/// Normalize a tag list: trimmed, non-empty, deduplicated.
pub fn clean_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Registry operations over one database.
pub struct Registry<'a> {
    db: &'a Database,
}

impl<'a> Registry<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    // =========================================================================
    // Patients
    // =========================================================================

    /// Register a patient. Duplicate email is a conflict.
    pub fn register_patient(&self, registration: &PatientRegistration) -> CareResult<Patient> {
        let name = registration
            .profile
            .name
            .as_deref()
            .unwrap_or(registration.name.as_str());
        let (name, email) = validate_identity(name, &registration.email)?;
        let mut patient = Patient::new(name, email);
        registration.profile.apply(&mut patient);
        patient.updated_at = patient.created_at;

        self.db.insert_patient(&patient)?;
        info!("Registered patient {}", patient.patient_id);
        Ok(patient)
    }

    pub fn patient(&self, patient_id: &str) -> CareResult<Patient> {
        self.db
            .get_patient(patient_id)?
            .ok_or_else(|| CareError::NotFound(format!("patient {}", patient_id)))
    }

    /// Apply a profile edit.
    pub fn update_profile(&self, patient_id: &str, update: &ProfileUpdate) -> CareResult<Patient> {
        let mut patient = self.patient(patient_id)?;
        update.apply(&mut patient);
        if patient.name.is_empty() {
            return Err(CareError::Validation("name is required".into()));
        }
        if !self.db.update_patient(&patient)? {
            return Err(CareError::NotFound(format!("patient {}", patient_id)));
        }
        Ok(patient)
    }

    /// Replace a patient's tags.
    pub fn set_tags(&self, patient_id: &str, tags: &[String]) -> CareResult<BTreeSet<String>> {
        let tags = clean_tags(tags);
        if !self.db.set_patient_tags(patient_id, &tags, &now())? {
            return Err(CareError::NotFound(format!("patient {}", patient_id)));
        }
        Ok(tags)
    }

    /// Add one tag to each listed patient.
    pub fn bulk_add_tag(&self, patient_ids: &[String], tag: &str) -> CareResult<BulkOutcome> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(CareError::Validation("tag is required".into()));
        }
        if patient_ids.is_empty() {
            return Err(CareError::Validation("no patients selected".into()));
        }

        let results = patient_ids
            .iter()
            .map(|patient_id| match self.add_tag(patient_id, tag) {
                Ok(()) => BulkItemResult {
                    patient_id: patient_id.clone(),
                    success: true,
                    message: format!("Tag \"{}\" added", tag),
                },
                Err(e) => BulkItemResult {
                    patient_id: patient_id.clone(),
                    success: false,
                    message: e.to_string(),
                },
            })
            .collect();
        Ok(BulkOutcome::from_results(results))
    }

    fn add_tag(&self, patient_id: &str, tag: &str) -> CareResult<()> {
        let mut patient = self.patient(patient_id)?;
        patient.tags.insert(tag.to_string());
        if !self.db.set_patient_tags(patient_id, &patient.tags, &now())? {
            return Err(CareError::NotFound(format!("patient {}", patient_id)));
        }
        Ok(())
    }

    // =========================================================================
    // Clinicians
    // =========================================================================

    /// Register a clinician. Duplicate email is a conflict.
    pub fn register_clinician(&self, registration: &ClinicianRegistration) -> CareResult<Clinician> {
        let (name, email) = validate_identity(&registration.name, &registration.email)?;
        let mut clinician = Clinician::new(name, email);
        clinician.phone = registration.phone.clone();
        clinician.specialization = registration.specialization.clone();

        self.db.insert_clinician(&clinician)?;
        info!("Registered clinician {}", clinician.clinician_id);
        Ok(clinician)
    }

    pub fn clinician(&self, clinician_id: &str) -> CareResult<Clinician> {
        self.db
            .get_clinician(clinician_id)?
            .ok_or_else(|| CareError::NotFound(format!("clinician {}", clinician_id)))
    }

    /// Make a clinician responsible for a patient.
    pub fn assign_clinician(&self, patient_id: &str, clinician_id: &str) -> CareResult<()> {
        let at = now();
        self.db.in_transaction(|db| {
            db.assign_patient_to_clinician(patient_id, clinician_id, &at)
                .map_err(CareError::from)
        })?;
        info!("Assigned {} to {}", patient_id, clinician_id);
        Ok(())
    }

    /// Append a clinician-authored recommendation for a stage label.
    pub fn issue_recommendation(
        &self,
        recommender: &Recommender,
        clinician_id: &str,
        patient_id: &str,
        stage: &str,
        language: Language,
    ) -> CareResult<Recommendation> {
        let stage: StageLabel = stage.parse()?;
        self.clinician(clinician_id)?;
        self.patient(patient_id)?;

        let plan = recommender.resolve_stage(stage, language);
        let recommendation = Recommendation::new(
            patient_id.to_string(),
            stage,
            plan.diet_plan,
            plan.exercise_plan,
            plan.lifestyle_tips,
            language,
            RecommendationSource::Clinician(clinician_id.to_string()),
        );
        self.db.insert_recommendation(&recommendation)?;
        Ok(recommendation)
    }

    /// The most recent recommendation for a patient, if any.
    pub fn latest_recommendation(&self, patient_id: &str) -> CareResult<Option<Recommendation>> {
        self.patient(patient_id)?;
        Ok(self.db.latest_recommendation(patient_id)?)
    }
}
