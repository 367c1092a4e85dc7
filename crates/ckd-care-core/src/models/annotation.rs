//! Clinician-authored records attached to a patient: messages, notes,
//! follow-ups and report metadata.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::labels::now;
use super::patient::generate_id;

/// Message category. Only instructions exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Instruction,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Instruction => "instruction",
        }
    }
}

/// A clinician → patient message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Stable id (`MSG_` prefix)
    pub message_id: String,
    pub patient_id: String,
    pub clinician_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(patient_id: String, clinician_id: String, content: String) -> Self {
        Self {
            message_id: generate_id("MSG"),
            patient_id,
            clinician_id,
            content,
            kind: MessageKind::Instruction,
            read: false,
            created_at: now(),
            read_at: None,
        }
    }
}

/// A clinician's note on a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientNote {
    /// Stable id (`NOTE_` prefix)
    pub note_id: String,
    pub patient_id: String,
    pub clinician_id: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientNote {
    pub fn new(patient_id: String, clinician_id: String, content: String, tags: Vec<String>) -> Self {
        let now = now();
        Self {
            note_id: generate_id("NOTE"),
            patient_id,
            clinician_id,
            content,
            tags,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Follow-up appointment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpStatus {
    Scheduled,
    Completed,
    Cancelled,
    Missed,
}

impl FollowUpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowUpStatus::Scheduled => "scheduled",
            FollowUpStatus::Completed => "completed",
            FollowUpStatus::Cancelled => "cancelled",
            FollowUpStatus::Missed => "missed",
        }
    }
}

impl fmt::Display for FollowUpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FollowUpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(FollowUpStatus::Scheduled),
            "completed" => Ok(FollowUpStatus::Completed),
            "cancelled" => Ok(FollowUpStatus::Cancelled),
            "missed" => Ok(FollowUpStatus::Missed),
            other => Err(format!("Unknown follow-up status: {}", other)),
        }
    }
}

/// Default reminder lead time in days.
pub const DEFAULT_REMINDER_DAYS: u32 = 7;

/// A scheduled follow-up appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FollowUp {
    /// Stable id (`FU_` prefix)
    pub follow_up_id: String,
    pub patient_id: String,
    pub clinician_id: String,
    /// Appointment time (local clinic time, no zone)
    pub scheduled_for: NaiveDateTime,
    pub reminder_days: u32,
    pub notes: String,
    pub status: FollowUpStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FollowUp {
    pub fn new(
        patient_id: String,
        clinician_id: String,
        scheduled_for: NaiveDateTime,
        reminder_days: u32,
        notes: String,
    ) -> Self {
        let now = now();
        Self {
            follow_up_id: generate_id("FU"),
            patient_id,
            clinician_id,
            scheduled_for,
            reminder_days,
            notes,
            status: FollowUpStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Metadata for a generated prediction report. Rendering happens elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    /// Stable id (`RPT_` prefix)
    pub report_id: String,
    pub patient_id: String,
    pub clinician_id: Option<String>,
    pub prediction_id: String,
    pub report_type: String,
    /// Where the rendered document is stored
    pub file_path: String,
    pub email_sent: bool,
    pub created_at: DateTime<Utc>,
}

impl Report {
    /// Report metadata for a prediction.
    pub fn for_prediction(
        patient_id: String,
        clinician_id: Option<String>,
        prediction_id: String,
    ) -> Self {
        let report_id = generate_id("RPT");
        let file_path = format!("reports/{}.pdf", report_id);
        Self {
            report_id,
            patient_id,
            clinician_id,
            prediction_id,
            report_type: "prediction".into(),
            file_path,
            email_sent: false,
            created_at: now(),
        }
    }
}
