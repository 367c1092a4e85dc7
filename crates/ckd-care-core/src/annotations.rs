//! Clinician-authored records on a patient: messages, notes, follow-ups and
//! report metadata. Every write checks that its patient and clinician exist.

use chrono::{NaiveDate, NaiveDateTime};
use log::info;

use crate::db::Database;
use crate::models::{
    now, FollowUp, FollowUpStatus, Message, PatientNote, Report, DEFAULT_REMINDER_DAYS,
};
use crate::registry::{clean_tags, BulkItemResult, BulkOutcome};
use crate::{CareError, CareResult};

/// Parse a follow-up time: `YYYY-MM-DDTHH:MM[:SS]`, `YYYY-MM-DD HH:MM[:SS]`
/// or a bare date (midnight).
pub fn parse_schedule(raw: &str) -> CareResult<NaiveDateTime> {
    let raw = raw.trim();
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| CareError::Validation(format!("invalid scheduled date: {:?}", raw)))
}

fn required_text(field: &str, value: &str) -> CareResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CareError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

/// Annotation operations over one database.
pub struct Annotations<'a> {
    db: &'a Database,
}

impl<'a> Annotations<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn require_patient(&self, patient_id: &str) -> CareResult<()> {
        if !self.db.patient_exists(patient_id)? {
            return Err(CareError::NotFound(format!("patient {}", patient_id)));
        }
        Ok(())
    }

    fn require_clinician(&self, clinician_id: &str) -> CareResult<()> {
        if !self.db.clinician_exists(clinician_id)? {
            return Err(CareError::NotFound(format!("clinician {}", clinician_id)));
        }
        Ok(())
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Send an instruction from a clinician to a patient.
    pub fn send_message(&self, clinician_id: &str, patient_id: &str, content: &str) -> CareResult<Message> {
        let content = required_text("message content", content)?;
        self.require_clinician(clinician_id)?;
        self.require_patient(patient_id)?;

        let message = Message::new(patient_id.to_string(), clinician_id.to_string(), content);
        self.db.insert_message(&message)?;
        info!("Message {} sent to {}", message.message_id, patient_id);
        Ok(message)
    }

    /// A patient's inbox, newest first.
    pub fn patient_messages(&self, patient_id: &str) -> CareResult<Vec<Message>> {
        self.require_patient(patient_id)?;
        Ok(self.db.list_messages_for_patient(patient_id)?)
    }

    /// Messages a clinician sent, optionally to one patient, newest first.
    pub fn clinician_messages(
        &self,
        clinician_id: &str,
        patient_id: Option<&str>,
    ) -> CareResult<Vec<Message>> {
        self.require_clinician(clinician_id)?;
        Ok(self.db.list_messages_for_clinician(clinician_id, patient_id)?)
    }

    /// Mark a message read on behalf of the patient it was sent to.
    pub fn mark_read(&self, patient_id: &str, message_id: &str) -> CareResult<Message> {
        if !self.db.mark_message_read(message_id, patient_id, &now())? {
            return Err(CareError::NotFound(format!(
                "message {} for patient {}",
                message_id, patient_id
            )));
        }
        self.db
            .get_message(message_id)?
            .ok_or_else(|| CareError::NotFound(format!("message {}", message_id)))
    }

    // =========================================================================
    // Notes
    // =========================================================================

    pub fn add_note(
        &self,
        clinician_id: &str,
        patient_id: &str,
        content: &str,
        tags: &[String],
    ) -> CareResult<PatientNote> {
        let content = required_text("note content", content)?;
        self.require_clinician(clinician_id)?;
        self.require_patient(patient_id)?;

        let note = PatientNote::new(
            patient_id.to_string(),
            clinician_id.to_string(),
            content,
            clean_tags(tags).into_iter().collect(),
        );
        self.db.insert_note(&note)?;
        Ok(note)
    }

    /// A patient's notes, newest first.
    pub fn notes(&self, patient_id: &str) -> CareResult<Vec<PatientNote>> {
        self.require_patient(patient_id)?;
        Ok(self.db.list_notes(patient_id)?)
    }

    // =========================================================================
    // Follow-ups
    // =========================================================================

    /// Schedule a follow-up. `reminder_days` defaults to 7.
    pub fn schedule_follow_up(
        &self,
        clinician_id: &str,
        patient_id: &str,
        scheduled_for: &str,
        reminder_days: Option<u32>,
        notes: &str,
    ) -> CareResult<FollowUp> {
        let scheduled_for = parse_schedule(scheduled_for)?;
        self.require_clinician(clinician_id)?;
        self.require_patient(patient_id)?;

        let follow_up = FollowUp::new(
            patient_id.to_string(),
            clinician_id.to_string(),
            scheduled_for,
            reminder_days.unwrap_or(DEFAULT_REMINDER_DAYS),
            notes.trim().to_string(),
        );
        self.db.insert_follow_up(&follow_up)?;
        Ok(follow_up)
    }

    /// Follow-ups, soonest first.
    pub fn follow_ups(&self, patient_id: Option<&str>) -> CareResult<Vec<FollowUp>> {
        if let Some(patient_id) = patient_id {
            self.require_patient(patient_id)?;
        }
        Ok(self.db.list_follow_ups(patient_id)?)
    }

    pub fn set_follow_up_status(&self, follow_up_id: &str, status: &str) -> CareResult<()> {
        let status: FollowUpStatus = status.parse().map_err(CareError::Validation)?;
        if !self.db.update_follow_up_status(follow_up_id, status, &now())? {
            return Err(CareError::NotFound(format!("follow-up {}", follow_up_id)));
        }
        Ok(())
    }

    // =========================================================================
    // Reports
    // =========================================================================

    /// Record report metadata for a prediction.
    pub fn record_report(&self, prediction_id: &str, clinician_id: Option<&str>) -> CareResult<Report> {
        if let Some(clinician_id) = clinician_id {
            self.require_clinician(clinician_id)?;
        }
        let prediction = self
            .db
            .get_prediction(prediction_id)?
            .ok_or_else(|| CareError::NotFound(format!("prediction {}", prediction_id)))?;

        let report = Report::for_prediction(
            prediction.patient_id,
            clinician_id.map(str::to_string),
            prediction.prediction_id,
        );
        self.db.insert_report(&report)?;
        Ok(report)
    }

    /// Record a report for each patient's latest prediction.
    pub fn bulk_reports(&self, patient_ids: &[String], clinician_id: Option<&str>) -> CareResult<BulkOutcome> {
        if patient_ids.is_empty() {
            return Err(CareError::Validation("no patients selected".into()));
        }
        if let Some(clinician_id) = clinician_id {
            self.require_clinician(clinician_id)?;
        }

        let results = patient_ids
            .iter()
            .map(|patient_id| {
                let outcome = self
                    .db
                    .latest_prediction(patient_id)
                    .map_err(CareError::from)
                    .and_then(|latest| {
                        latest.ok_or_else(|| {
                            CareError::NotFound(format!("predictions for {}", patient_id))
                        })
                    })
                    .and_then(|latest| self.record_report(&latest.prediction_id, clinician_id));
                match outcome {
                    Ok(report) => BulkItemResult {
                        patient_id: patient_id.clone(),
                        success: true,
                        message: format!("Report {} recorded", report.report_id),
                    },
                    Err(e) => BulkItemResult {
                        patient_id: patient_id.clone(),
                        success: false,
                        message: e.to_string(),
                    },
                }
            })
            .collect();
        Ok(BulkOutcome::from_results(results))
    }

    /// A patient's report history, newest first.
    pub fn reports(&self, patient_id: &str) -> CareResult<Vec<Report>> {
        self.require_patient(patient_id)?;
        Ok(self.db.list_reports(patient_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Clinician, FeatureSnapshot, Patient, Prediction, PredictionResult, RiskLevel};

    fn setup_db() -> (Database, Patient, Clinician) {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Sunita".into(), "sunita@example.com".into());
        db.insert_patient(&patient).unwrap();
        let clinician = Clinician::new("Dr. Menon".into(), "menon@clinic.example".into());
        db.insert_clinician(&clinician).unwrap();
        (db, patient, clinician)
    }

    fn record_prediction(db: &Database, patient_id: &str) -> Prediction {
        let prediction = Prediction::new(
            patient_id.into(),
            None,
            FeatureSnapshot {
                names: vec!["eGFR".into()],
                values: vec![62.0],
                model_input: vec![62.0],
            },
            PredictionResult {
                ckd_binary: true,
                ckd_stage: crate::predict::derive_stage(62.0),
                confidence: 0.71,
                risk_level: RiskLevel::Medium,
            },
            None,
            "test".into(),
        );
        db.insert_prediction(&prediction).unwrap();
        prediction
    }

    #[test]
    fn test_parse_schedule_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 15)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(parse_schedule("2025-01-15T09:30").unwrap(), expected);
        assert_eq!(parse_schedule("2025-01-15T09:30:00").unwrap(), expected);
        assert_eq!(parse_schedule("2025-01-15 09:30").unwrap(), expected);
        assert_eq!(
            parse_schedule("2025-01-15").unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert!(matches!(parse_schedule("next week"), Err(CareError::Validation(_))));
    }

    #[test]
    fn test_message_lifecycle() {
        let (db, patient, clinician) = setup_db();
        let annotations = Annotations::new(&db);

        assert!(matches!(
            annotations.send_message(&clinician.clinician_id, &patient.patient_id, "   "),
            Err(CareError::Validation(_))
        ));
        assert!(matches!(
            annotations.send_message(&clinician.clinician_id, "PAT_missing", "Drink water"),
            Err(CareError::NotFound(_))
        ));

        let message = annotations
            .send_message(&clinician.clinician_id, &patient.patient_id, "  Reduce salt  ")
            .unwrap();
        assert_eq!(message.content, "Reduce salt");
        assert!(!message.read);

        let other = Patient::new("Other".into(), "other@example.com".into());
        db.insert_patient(&other).unwrap();
        assert!(matches!(
            annotations.mark_read(&other.patient_id, &message.message_id),
            Err(CareError::NotFound(_))
        ));

        let read = annotations.mark_read(&patient.patient_id, &message.message_id).unwrap();
        assert!(read.read);
        assert!(read.read_at.is_some());

        assert_eq!(annotations.patient_messages(&patient.patient_id).unwrap().len(), 1);
        assert_eq!(
            annotations
                .clinician_messages(&clinician.clinician_id, Some(&other.patient_id))
                .unwrap()
                .len(),
            0
        );
    }

    #[test]
    fn test_notes_newest_first() {
        let (db, patient, clinician) = setup_db();
        let annotations = Annotations::new(&db);
        annotations
            .add_note(&clinician.clinician_id, &patient.patient_id, "first", &[])
            .unwrap();
        annotations
            .add_note(
                &clinician.clinician_id,
                &patient.patient_id,
                "second",
                &["diet".to_string()],
            )
            .unwrap();
        let notes = annotations.notes(&patient.patient_id).unwrap();
        assert_eq!(notes[0].content, "second");
        assert_eq!(notes[0].tags, vec!["diet".to_string()]);
    }

    #[test]
    fn test_follow_ups() {
        let (db, patient, clinician) = setup_db();
        let annotations = Annotations::new(&db);
        let later = annotations
            .schedule_follow_up(&clinician.clinician_id, &patient.patient_id, "2025-03-01", None, "")
            .unwrap();
        let sooner = annotations
            .schedule_follow_up(
                &clinician.clinician_id,
                &patient.patient_id,
                "2025-02-01T10:00",
                Some(3),
                "labs",
            )
            .unwrap();
        assert_eq!(later.reminder_days, DEFAULT_REMINDER_DAYS);
        assert_eq!(later.status, FollowUpStatus::Scheduled);

        let listed = annotations.follow_ups(None).unwrap();
        assert_eq!(listed[0].follow_up_id, sooner.follow_up_id);

        annotations
            .set_follow_up_status(&sooner.follow_up_id, "completed")
            .unwrap();
        let listed = annotations.follow_ups(Some(&patient.patient_id)).unwrap();
        assert_eq!(listed[0].status, FollowUpStatus::Completed);

        assert!(matches!(
            annotations.set_follow_up_status(&sooner.follow_up_id, "postponed"),
            Err(CareError::Validation(_))
        ));
        assert!(matches!(
            annotations.set_follow_up_status("FU_missing", "missed"),
            Err(CareError::NotFound(_))
        ));
    }

    #[test]
    fn test_reports() {
        let (db, patient, clinician) = setup_db();
        let annotations = Annotations::new(&db);
        let prediction = record_prediction(&db, &patient.patient_id);

        let report = annotations
            .record_report(&prediction.prediction_id, Some(&clinician.clinician_id))
            .unwrap();
        assert_eq!(report.patient_id, patient.patient_id);
        assert!(report.file_path.ends_with(".pdf"));
        assert!(matches!(
            annotations.record_report("PRED_missing", None),
            Err(CareError::NotFound(_))
        ));

        let bare = Patient::new("NoPred".into(), "nopred@example.com".into());
        db.insert_patient(&bare).unwrap();
        let outcome = annotations
            .bulk_reports(&[patient.patient_id.clone(), bare.patient_id.clone()], None)
            .unwrap();
        assert_eq!((outcome.successful, outcome.failed), (1, 1));
        assert_eq!(annotations.reports(&patient.patient_id).unwrap().len(), 2);
    }
}
