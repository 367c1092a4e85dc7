//! Patient and clinician models.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::labels::{now, Gender};

/// Generate a prefixed record id, e.g. `PAT_3f2a...`.
pub(crate) fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

/// Minimal structural email check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
        }
        None => false,
    }
}

/// A registered patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Stable id (`PAT_` prefix)
    pub patient_id: String,
    /// Display name
    pub name: String,
    /// Login email, unique across patients (case-insensitive)
    pub email: String,
    pub phone: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    /// Free-form tags set by clinicians
    pub tags: BTreeSet<String>,
    /// Clinician currently responsible for this patient
    pub assigned_clinician_id: Option<String>,
    /// Join date
    pub created_at: DateTime<Utc>,
    /// Last profile/tag/assignment change
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Create a new patient with required fields.
    pub fn new(name: String, email: String) -> Self {
        let now = now();
        Self {
            patient_id: generate_id("PAT"),
            name,
            email,
            phone: None,
            age: None,
            gender: None,
            address: None,
            emergency_contact: None,
            tags: BTreeSet::new(),
            assigned_clinician_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = now();
    }

    /// Profile fields the data quality check considers missing.
    pub fn missing_profile_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.age.is_none() {
            missing.push("age");
        }
        if self.gender.is_none() {
            missing.push("gender");
        }
        if is_blank(&self.phone) {
            missing.push("phone");
        }
        if is_blank(&self.address) {
            missing.push("address");
        }
        missing
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Partial profile edit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
}

impl ProfileUpdate {
    /// Apply the edit and touch `updated_at`.
    pub fn apply(&self, patient: &mut Patient) {
        if let Some(name) = &self.name {
            patient.name = name.trim().to_string();
        }
        if let Some(phone) = &self.phone {
            patient.phone = Some(phone.clone());
        }
        if let Some(age) = self.age {
            patient.age = Some(age);
        }
        if let Some(gender) = self.gender {
            patient.gender = Some(gender);
        }
        if let Some(address) = &self.address {
            patient.address = Some(address.clone());
        }
        if let Some(contact) = &self.emergency_contact {
            patient.emergency_contact = Some(contact.clone());
        }
        patient.touch();
    }
}

/// A clinician (doctor) account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clinician {
    /// Stable id (`DOC_` prefix)
    pub clinician_id: String,
    pub name: String,
    /// Login email, unique across clinicians (case-insensitive)
    pub email: String,
    pub phone: Option<String>,
    pub specialization: Option<String>,
    /// Back-reference cache of assigned patients. The patient's
    /// `assigned_clinician_id` is authoritative.
    pub patients_under_care: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Clinician {
    /// Create a new clinician with required fields.
    pub fn new(name: String, email: String) -> Self {
        let now = now();
        Self {
            clinician_id: generate_id("DOC"),
            name,
            email,
            phone: None,
            specialization: None,
            patients_under_care: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
