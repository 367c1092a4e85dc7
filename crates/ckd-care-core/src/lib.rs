//! CKD Care Core Library
//!
//! Record clinical measurements, predict Chronic Kidney Disease stage with
//! an injected classifier, and keep an append-only history of predictions
//! and diet/exercise recommendations per patient.
//!
//! # Architecture
//!
//! ```text
//! raw input ─► Normalizer ─► Scaler ─► Classifier ─► stage/risk derivation
//!                                                        │
//!                                        Explainer (bounded, optional)
//!                                                        │
//!                               ┌────────────────────────▼──────────────┐
//!                               │  one transaction:                      │
//!                               │    Prediction (input snapshot, digest) │
//!                               │    Recommendation (stage → plan)       │
//!                               └────────────────────────┬──────────────┘
//!                                                        │
//!                      ┌─────────────────────────────────┼──────────────────┐
//!                      ▼                                 ▼                  ▼
//!               Patient query                       Analytics           Insights
//!          (filter → latest → filter → page)   (filtered counts)  (trends, attribution)
//! ```
//!
//! # Modules
//!
//! - [`db`]: SQLite storage, one table per record kind
//! - [`models`]: Domain types (Patient, Prediction, Recommendation, ...)
//! - [`predict`]: Feature normalizer, derivation and the prediction pipeline
//! - [`recommend`]: Stage → plan lookup and lifestyle tips
//! - [`query`]: Patient filtering and pagination
//! - [`analytics`]: Prediction aggregates for the dashboard
//! - [`insights`]: Per-patient clinician views and the data quality check
//! - [`registry`] / [`annotations`]: Registration, tags, messages, notes,
//!   follow-ups and reports

pub mod analytics;
pub mod annotations;
pub mod config;
pub mod db;
pub mod insights;
pub mod models;
pub mod predict;
pub mod query;
pub mod recommend;
pub mod registry;

// Re-export commonly used types
pub use analytics::{AnalyticsFilter, AnalyticsReport, ModelEvaluation};
pub use config::CareConfig;
pub use db::Database;
pub use models::{
    CkdStage, Gender, HealthStatus, Language, Patient, Prediction, Recommendation, RiskLevel,
    StageLabel,
};
pub use predict::{
    ClinicalInput, ModelBundle, PartialFailure, PendingPrediction, PredictionOutcome,
    PredictionPipeline, PredictionRequest,
};
pub use query::{FilterParams, Page, PageRequest, PatientSummary};
pub use recommend::Recommender;

use std::sync::{Arc, Mutex};

use log::info;

use analytics::Analytics;
use annotations::Annotations;
use insights::{
    AttributionSummary, DataQualityReport, Insights, PatientDetail, PredictionComparison,
    TrendPoint,
};
use models::{Clinician, FollowUp, Message, PatientNote, ProfileUpdate, Report};
use query::{PatientFilter, PatientQuery};
use recommend::ResolvedPlan;
use registry::{BulkOutcome, ClinicianRegistration, PatientRegistration, Registry};

// =========================================================================
// Error Type
// =========================================================================

#[derive(Debug, thiserror::Error)]
pub enum CareError {
    /// Malformed or out-of-contract input. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness constraint violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Classifier or store unreachable. Safe to retry.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Invalid model bundle, plan table or config file
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CareResult<T> = Result<T, CareError>;

impl From<db::DbError> for CareError {
    fn from(e: db::DbError) -> Self {
        use db::DbError;
        if e.is_unavailable() {
            return CareError::ServiceUnavailable(e.to_string());
        }
        match e {
            DbError::Conflict(record) => CareError::Conflict(record),
            DbError::NotFound(record) | DbError::MissingReference(record) => {
                CareError::NotFound(record)
            }
            other => CareError::Storage(other.to_string()),
        }
    }
}

impl From<models::LabelError> for CareError {
    fn from(e: models::LabelError) -> Self {
        CareError::Validation(e.to_string())
    }
}

impl From<predict::NormalizeError> for CareError {
    fn from(e: predict::NormalizeError) -> Self {
        CareError::Validation(e.to_string())
    }
}

impl From<ckd_care_model::ModelError> for CareError {
    fn from(e: ckd_care_model::ModelError) -> Self {
        CareError::Configuration(e.to_string())
    }
}

impl From<recommend::PlanError> for CareError {
    fn from(e: recommend::PlanError) -> Self {
        CareError::Configuration(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for CareError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        CareError::ServiceUnavailable(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Service Facade
// =========================================================================

/// Thread-safe entry point over one database and one model bundle.
pub struct CkdCare {
    db: Arc<Mutex<Database>>,
    pipeline: Option<PredictionPipeline>,
    recommender: Arc<Recommender>,
    config: CareConfig,
}

impl CkdCare {
    /// Open the database and load the model bundle and plan table named by
    /// the config.
    pub fn open(config: CareConfig) -> CareResult<Self> {
        let db = Database::open(&config.database_path)?;
        let bundle = config
            .model_bundle_path
            .as_ref()
            .map(ModelBundle::load)
            .transpose()?;
        info!(
            "Opened {} (model {})",
            config.database_path.display(),
            if bundle.is_some() { "loaded" } else { "not loaded" }
        );
        Self::assemble(db, bundle, config)
    }

    /// In-memory database with an explicitly supplied bundle.
    pub fn in_memory(bundle: Option<ModelBundle>, config: CareConfig) -> CareResult<Self> {
        Self::assemble(Database::open_in_memory()?, bundle, config)
    }

    fn assemble(db: Database, bundle: Option<ModelBundle>, config: CareConfig) -> CareResult<Self> {
        let recommender = Arc::new(match &config.recommendation_plans_path {
            Some(path) => Recommender::load(path)?,
            None => Recommender::builtin()?,
        });
        let pipeline = bundle.map(|bundle| {
            PredictionPipeline::new(bundle, Arc::clone(&recommender)).with_timeouts(config.timeouts())
        });
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            pipeline,
            recommender,
            config,
        })
    }

    pub fn config(&self) -> &CareConfig {
        &self.config
    }

    pub fn has_model(&self) -> bool {
        self.pipeline.is_some()
    }

    // =========================================================================
    // Patients and Clinicians
    // =========================================================================

    pub fn register_patient(&self, registration: &PatientRegistration) -> CareResult<Patient> {
        let db = self.db.lock()?;
        Registry::new(&db).register_patient(registration)
    }

    pub fn get_patient(&self, patient_id: &str) -> CareResult<Patient> {
        let db = self.db.lock()?;
        Registry::new(&db).patient(patient_id)
    }

    pub fn update_profile(&self, patient_id: &str, update: &ProfileUpdate) -> CareResult<Patient> {
        let db = self.db.lock()?;
        Registry::new(&db).update_profile(patient_id, update)
    }

    pub fn register_clinician(&self, registration: &ClinicianRegistration) -> CareResult<Clinician> {
        let db = self.db.lock()?;
        Registry::new(&db).register_clinician(registration)
    }

    pub fn get_clinician(&self, clinician_id: &str) -> CareResult<Clinician> {
        let db = self.db.lock()?;
        Registry::new(&db).clinician(clinician_id)
    }

    pub fn assign_clinician(&self, patient_id: &str, clinician_id: &str) -> CareResult<()> {
        let db = self.db.lock()?;
        Registry::new(&db).assign_clinician(patient_id, clinician_id)
    }

    pub fn set_tags(&self, patient_id: &str, tags: &[String]) -> CareResult<Vec<String>> {
        let db = self.db.lock()?;
        Ok(Registry::new(&db).set_tags(patient_id, tags)?.into_iter().collect())
    }

    pub fn bulk_add_tag(&self, patient_ids: &[String], tag: &str) -> CareResult<BulkOutcome> {
        let db = self.db.lock()?;
        Registry::new(&db).bulk_add_tag(patient_ids, tag)
    }

    // =========================================================================
    // Prediction and Recommendations
    // =========================================================================

    /// Run the prediction pipeline. The database lock is held for the
    /// reference check and the final transaction, never during inference.
    pub fn predict(&self, request: &PredictionRequest) -> CareResult<PredictionOutcome> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| CareError::ServiceUnavailable("model not loaded".into()))?;
        {
            let db = self.db.lock()?;
            pipeline.check_references(&db, request)?;
        }
        let pending = pipeline.compute(request)?;
        let db = self.db.lock()?;
        pipeline.commit(&db, pending)
    }

    pub fn get_prediction(&self, prediction_id: &str) -> CareResult<Prediction> {
        let db = self.db.lock()?;
        db.get_prediction(prediction_id)?
            .ok_or_else(|| CareError::NotFound(format!("prediction {}", prediction_id)))
    }

    /// Pure plan lookup; unknown labels get the "No CKD" plan.
    pub fn resolve_recommendation(&self, stage: &str, language: Language) -> ResolvedPlan {
        self.recommender.resolve(stage, language)
    }

    pub fn issue_recommendation(
        &self,
        clinician_id: &str,
        patient_id: &str,
        stage: &str,
        language: Language,
    ) -> CareResult<Recommendation> {
        let db = self.db.lock()?;
        Registry::new(&db).issue_recommendation(
            &self.recommender,
            clinician_id,
            patient_id,
            stage,
            language,
        )
    }

    pub fn latest_recommendation(&self, patient_id: &str) -> CareResult<Option<Recommendation>> {
        let db = self.db.lock()?;
        Registry::new(&db).latest_recommendation(patient_id)
    }

    // =========================================================================
    // Query and Analytics
    // =========================================================================

    pub fn query_patients(
        &self,
        params: &FilterParams,
        page: PageRequest,
    ) -> CareResult<Page<PatientSummary>> {
        let filter = PatientFilter::try_from(params)?;
        let db = self.db.lock()?;
        PatientQuery::new(&db).run(&filter, page)
    }

    pub fn analytics(&self, filter: &AnalyticsFilter) -> CareResult<AnalyticsReport> {
        let db = self.db.lock()?;
        Analytics::new(
            &db,
            self.config.model_evaluation,
            self.config.recent_predictions_limit,
        )
        .report(filter)
    }

    // =========================================================================
    // Insights
    // =========================================================================

    pub fn patient_detail(&self, patient_id: &str) -> CareResult<PatientDetail> {
        let db = self.db.lock()?;
        Insights::new(&db).patient_detail(patient_id)
    }

    pub fn trends(&self, patient_id: &str) -> CareResult<Vec<TrendPoint>> {
        let db = self.db.lock()?;
        Insights::new(&db).trends(patient_id)
    }

    pub fn attribution_summary(&self, patient_id: &str) -> CareResult<AttributionSummary> {
        let db = self.db.lock()?;
        Insights::new(&db).attribution_summary(patient_id)
    }

    pub fn compare_predictions(
        &self,
        patient_id: &str,
        first_id: &str,
        second_id: &str,
    ) -> CareResult<PredictionComparison> {
        let db = self.db.lock()?;
        Insights::new(&db).compare_predictions(patient_id, first_id, second_id)
    }

    pub fn data_quality(&self) -> CareResult<DataQualityReport> {
        let db = self.db.lock()?;
        Insights::new(&db).data_quality()
    }

    // =========================================================================
    // Messages, Notes, Follow-ups, Reports
    // =========================================================================

    pub fn send_message(&self, clinician_id: &str, patient_id: &str, content: &str) -> CareResult<Message> {
        let db = self.db.lock()?;
        Annotations::new(&db).send_message(clinician_id, patient_id, content)
    }

    pub fn patient_messages(&self, patient_id: &str) -> CareResult<Vec<Message>> {
        let db = self.db.lock()?;
        Annotations::new(&db).patient_messages(patient_id)
    }

    pub fn clinician_messages(
        &self,
        clinician_id: &str,
        patient_id: Option<&str>,
    ) -> CareResult<Vec<Message>> {
        let db = self.db.lock()?;
        Annotations::new(&db).clinician_messages(clinician_id, patient_id)
    }

    pub fn mark_message_read(&self, patient_id: &str, message_id: &str) -> CareResult<Message> {
        let db = self.db.lock()?;
        Annotations::new(&db).mark_read(patient_id, message_id)
    }

    pub fn add_note(
        &self,
        clinician_id: &str,
        patient_id: &str,
        content: &str,
        tags: &[String],
    ) -> CareResult<PatientNote> {
        let db = self.db.lock()?;
        Annotations::new(&db).add_note(clinician_id, patient_id, content, tags)
    }

    pub fn notes(&self, patient_id: &str) -> CareResult<Vec<PatientNote>> {
        let db = self.db.lock()?;
        Annotations::new(&db).notes(patient_id)
    }

    pub fn schedule_follow_up(
        &self,
        clinician_id: &str,
        patient_id: &str,
        scheduled_for: &str,
        reminder_days: Option<u32>,
        notes: &str,
    ) -> CareResult<FollowUp> {
        let db = self.db.lock()?;
        Annotations::new(&db).schedule_follow_up(
            clinician_id,
            patient_id,
            scheduled_for,
            reminder_days,
            notes,
        )
    }

    pub fn follow_ups(&self, patient_id: Option<&str>) -> CareResult<Vec<FollowUp>> {
        let db = self.db.lock()?;
        Annotations::new(&db).follow_ups(patient_id)
    }

    pub fn set_follow_up_status(&self, follow_up_id: &str, status: &str) -> CareResult<()> {
        let db = self.db.lock()?;
        Annotations::new(&db).set_follow_up_status(follow_up_id, status)
    }

    pub fn record_report(&self, prediction_id: &str, clinician_id: Option<&str>) -> CareResult<Report> {
        let db = self.db.lock()?;
        Annotations::new(&db).record_report(prediction_id, clinician_id)
    }

    pub fn bulk_reports(&self, patient_ids: &[String], clinician_id: Option<&str>) -> CareResult<BulkOutcome> {
        let db = self.db.lock()?;
        Annotations::new(&db).bulk_reports(patient_ids, clinician_id)
    }

    pub fn reports(&self, patient_id: &str) -> CareResult<Vec<Report>> {
        let db = self.db.lock()?;
        Annotations::new(&db).reports(patient_id)
    }
}
