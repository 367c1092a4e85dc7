//! Patient and clinician database operations.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{ts_from_sql, ts_to_sql, Database, DbError, DbResult};
use crate::models::{Clinician, Gender, Patient};

impl Database {
    // =========================================================================
    // Patients
    // =========================================================================

    /// Insert a new patient. Duplicate id or email is a `Conflict`.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        let tags_json = serde_json::to_string(&patient.tags)?;
        self.conn
            .execute(
                r#"
                INSERT INTO patients (
                    patient_id, name, email, phone, age, gender, address,
                    emergency_contact, tags, assigned_clinician_id, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
                params![
                    patient.patient_id,
                    patient.name,
                    patient.email,
                    patient.phone,
                    patient.age,
                    patient.gender.map(|g| g.as_str()),
                    patient.address,
                    patient.emergency_contact,
                    tags_json,
                    patient.assigned_clinician_id,
                    ts_to_sql(&patient.created_at),
                    ts_to_sql(&patient.updated_at),
                ],
            )
            .map_err(|e| DbError::from_write(e, &format!("patient {}", patient.email)))?;
        Ok(())
    }

    /// Write back profile fields, tags and assignment of an existing patient.
    pub fn update_patient(&self, patient: &Patient) -> DbResult<bool> {
        let tags_json = serde_json::to_string(&patient.tags)?;
        let rows_affected = self
            .conn
            .execute(
                r#"
                UPDATE patients SET
                    name = ?2,
                    phone = ?3,
                    age = ?4,
                    gender = ?5,
                    address = ?6,
                    emergency_contact = ?7,
                    tags = ?8,
                    assigned_clinician_id = ?9,
                    updated_at = ?10
                WHERE patient_id = ?1
                "#,
                params![
                    patient.patient_id,
                    patient.name,
                    patient.phone,
                    patient.age,
                    patient.gender.map(|g| g.as_str()),
                    patient.address,
                    patient.emergency_contact,
                    tags_json,
                    patient.assigned_clinician_id,
                    ts_to_sql(&patient.updated_at),
                ],
            )
            .map_err(|e| DbError::from_write(e, &format!("patient {}", patient.patient_id)))?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, patient_id: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                r#"
                SELECT patient_id, name, email, phone, age, gender, address,
                       emergency_contact, tags, assigned_clinician_id, created_at, updated_at
                FROM patients
                WHERE patient_id = ?
                "#,
                [patient_id],
                read_patient_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get a patient by email (case-insensitive).
    pub fn get_patient_by_email(&self, email: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                r#"
                SELECT patient_id, name, email, phone, age, gender, address,
                       emergency_contact, tags, assigned_clinician_id, created_at, updated_at
                FROM patients
                WHERE email = ?
                "#,
                [email.trim()],
                read_patient_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Whether a patient with this ID exists.
    pub fn patient_exists(&self, patient_id: &str) -> DbResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM patients WHERE patient_id = ?",
                [patient_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// List all patients, newest first.
    pub fn list_patients(&self) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT patient_id, name, email, phone, age, gender, address,
                   emergency_contact, tags, assigned_clinician_id, created_at, updated_at
            FROM patients
            ORDER BY created_at DESC, rowid DESC
            "#,
        )?;

        let rows = stmt.query_map([], read_patient_row)?;

        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.try_into()?);
        }
        Ok(patients)
    }

    /// Total number of patients.
    pub fn count_patients(&self) -> DbResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Replace a patient's tag set.
    pub fn set_patient_tags(
        &self,
        patient_id: &str,
        tags: &BTreeSet<String>,
        updated_at: &DateTime<Utc>,
    ) -> DbResult<bool> {
        let tags_json = serde_json::to_string(tags)?;
        let rows_affected = self.conn.execute(
            "UPDATE patients SET tags = ?2, updated_at = ?3 WHERE patient_id = ?1",
            params![patient_id, tags_json, ts_to_sql(updated_at)],
        )?;
        Ok(rows_affected > 0)
    }

    /// Point a patient at a clinician and add the patient to the clinician's
    /// cached care list. Run inside a transaction.
    pub fn assign_patient_to_clinician(
        &self,
        patient_id: &str,
        clinician_id: &str,
        at: &DateTime<Utc>,
    ) -> DbResult<()> {
        let mut clinician = self
            .get_clinician(clinician_id)?
            .ok_or_else(|| DbError::NotFound(format!("clinician {}", clinician_id)))?;

        let rows_affected = self.conn.execute(
            "UPDATE patients SET assigned_clinician_id = ?2, updated_at = ?3 WHERE patient_id = ?1",
            params![patient_id, clinician_id, ts_to_sql(at)],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("patient {}", patient_id)));
        }

        clinician.patients_under_care.insert(patient_id.to_string());
        let care_json = serde_json::to_string(&clinician.patients_under_care)?;
        self.conn.execute(
            "UPDATE clinicians SET patients_under_care = ?2, updated_at = ?3 WHERE clinician_id = ?1",
            params![clinician_id, care_json, ts_to_sql(at)],
        )?;
        Ok(())
    }

    // =========================================================================
    // Clinicians
    // =========================================================================

    /// Insert a new clinician. Duplicate id or email is a `Conflict`.
    pub fn insert_clinician(&self, clinician: &Clinician) -> DbResult<()> {
        let care_json = serde_json::to_string(&clinician.patients_under_care)?;
        self.conn
            .execute(
                r#"
                INSERT INTO clinicians (
                    clinician_id, name, email, phone, specialization,
                    patients_under_care, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    clinician.clinician_id,
                    clinician.name,
                    clinician.email,
                    clinician.phone,
                    clinician.specialization,
                    care_json,
                    ts_to_sql(&clinician.created_at),
                    ts_to_sql(&clinician.updated_at),
                ],
            )
            .map_err(|e| DbError::from_write(e, &format!("clinician {}", clinician.email)))?;
        Ok(())
    }

    /// Get a clinician by ID.
    pub fn get_clinician(&self, clinician_id: &str) -> DbResult<Option<Clinician>> {
        self.conn
            .query_row(
                r#"
                SELECT clinician_id, name, email, phone, specialization,
                       patients_under_care, created_at, updated_at
                FROM clinicians
                WHERE clinician_id = ?
                "#,
                [clinician_id],
                |row| {
                    Ok(ClinicianRow {
                        clinician_id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        phone: row.get(3)?,
                        specialization: row.get(4)?,
                        patients_under_care: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Whether a clinician with this ID exists.
    pub fn clinician_exists(&self, clinician_id: &str) -> DbResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM clinicians WHERE clinician_id = ?",
                [clinician_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

/// Intermediate row struct for database mapping.
pub(crate) struct PatientRow {
    patient_id: String,
    name: String,
    email: String,
    phone: Option<String>,
    age: Option<u32>,
    gender: Option<String>,
    address: Option<String>,
    emergency_contact: Option<String>,
    tags: String,
    assigned_clinician_id: Option<String>,
    created_at: String,
    updated_at: String,
}

pub(crate) fn read_patient_row(row: &Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        patient_id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        age: row.get(4)?,
        gender: row.get(5)?,
        address: row.get(6)?,
        emergency_contact: row.get(7)?,
        tags: row.get(8)?,
        assigned_clinician_id: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl TryFrom<PatientRow> for Patient {
    type Error = DbError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        let gender = row.gender.as_deref().map(string_to_gender).transpose()?;
        Ok(Patient {
            patient_id: row.patient_id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            age: row.age,
            gender,
            address: row.address,
            emergency_contact: row.emergency_contact,
            tags: serde_json::from_str(&row.tags)?,
            assigned_clinician_id: row.assigned_clinician_id,
            created_at: ts_from_sql(&row.created_at)?,
            updated_at: ts_from_sql(&row.updated_at)?,
        })
    }
}

struct ClinicianRow {
    clinician_id: String,
    name: String,
    email: String,
    phone: Option<String>,
    specialization: Option<String>,
    patients_under_care: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ClinicianRow> for Clinician {
    type Error = DbError;

    fn try_from(row: ClinicianRow) -> Result<Self, Self::Error> {
        Ok(Clinician {
            clinician_id: row.clinician_id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            specialization: row.specialization,
            patients_under_care: serde_json::from_str(&row.patients_under_care)?,
            created_at: ts_from_sql(&row.created_at)?,
            updated_at: ts_from_sql(&row.updated_at)?,
        })
    }
}

pub(crate) fn string_to_gender(s: &str) -> Result<Gender, DbError> {
    s.parse()
        .map_err(|_| DbError::Constraint(format!("Unknown gender: {}", s)))
}
