//! Patient overview: each patient joined with its latest prediction.

use rusqlite::params;

use super::patients::read_patient_row;
use super::predictions::read_prediction_columns;
use super::{Database, DbResult};
use crate::models::{Gender, Patient, Prediction};

/// A patient with its most recent prediction, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientOverview {
    pub patient: Patient,
    pub latest: Option<Prediction>,
}

/// Number of patient columns preceding the prediction columns.
const PATIENT_COLUMN_COUNT: usize = 12;

impl Database {
    /// Patients (optionally of one gender) joined with their latest
    /// prediction, newest patient first. Ties on join date go to the later
    /// insert.
    pub fn patient_overviews(&self, gender: Option<Gender>) -> DbResult<Vec<PatientOverview>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT p.patient_id, p.name, p.email, p.phone, p.age, p.gender, p.address,
                   p.emergency_contact, p.tags, p.assigned_clinician_id, p.created_at, p.updated_at,
                   pr.prediction_id, pr.patient_id, pr.clinician_id, pr.feature_names,
                   pr.feature_values, pr.model_input, pr.input_digest, pr.ckd_binary,
                   pr.ckd_stage, pr.confidence, pr.risk_level, pr.attribution,
                   pr.model_used, pr.created_at
            FROM patients p
            LEFT JOIN predictions pr ON pr.rowid = (
                SELECT latest.rowid FROM predictions latest
                WHERE latest.patient_id = p.patient_id
                ORDER BY latest.created_at DESC, latest.rowid DESC
                LIMIT 1
            )
            WHERE ?1 IS NULL OR p.gender = ?1
            ORDER BY p.created_at DESC, p.rowid DESC
            "#,
        )?;

        let rows = stmt.query_map(params![gender.map(|g| g.as_str())], |row| {
            let patient = read_patient_row(row)?;
            let has_prediction: Option<String> = row.get(PATIENT_COLUMN_COUNT)?;
            let latest = match has_prediction {
                Some(_) => Some(read_prediction_columns(row, PATIENT_COLUMN_COUNT)?),
                None => None,
            };
            Ok((patient, latest))
        })?;

        let mut overviews = Vec::new();
        for row in rows {
            let (patient, latest) = row?;
            overviews.push(PatientOverview {
                patient: patient.try_into()?,
                latest: latest.map(Prediction::try_from).transpose()?,
            });
        }
        Ok(overviews)
    }
}
