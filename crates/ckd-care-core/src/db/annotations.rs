//! Message, note, follow-up and report database operations.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{ts_from_sql, ts_to_sql, Database, DbError, DbResult};
use crate::models::{FollowUp, FollowUpStatus, Message, MessageKind, PatientNote, Report};

/// Storage format for follow-up times (local, no zone).
const FOLLOW_UP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

impl Database {
    // =========================================================================
    // Messages
    // =========================================================================

    /// Insert a new message.
    pub fn insert_message(&self, message: &Message) -> DbResult<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO messages (
                    message_id, patient_id, clinician_id, content, kind, read, created_at, read_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    message.message_id,
                    message.patient_id,
                    message.clinician_id,
                    message.content,
                    message.kind.as_str(),
                    message.read,
                    ts_to_sql(&message.created_at),
                    message.read_at.as_ref().map(ts_to_sql),
                ],
            )
            .map_err(|e| DbError::from_write(e, &format!("message for patient {}", message.patient_id)))?;
        Ok(())
    }

    /// Get a message by ID.
    pub fn get_message(&self, message_id: &str) -> DbResult<Option<Message>> {
        self.conn
            .query_row(
                r#"
                SELECT message_id, patient_id, clinician_id, content, kind, read, created_at, read_at
                FROM messages
                WHERE message_id = ?
                "#,
                [message_id],
                read_message_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Messages for a patient, newest first.
    pub fn list_messages_for_patient(&self, patient_id: &str) -> DbResult<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT message_id, patient_id, clinician_id, content, kind, read, created_at, read_at
            FROM messages
            WHERE patient_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )?;
        let rows = stmt.query_map([patient_id], read_message_row)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?.try_into()?);
        }
        Ok(messages)
    }

    /// Messages sent by a clinician, optionally to one patient, newest first.
    pub fn list_messages_for_clinician(
        &self,
        clinician_id: &str,
        patient_id: Option<&str>,
    ) -> DbResult<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT message_id, patient_id, clinician_id, content, kind, read, created_at, read_at
            FROM messages
            WHERE clinician_id = ?1 AND (?2 IS NULL OR patient_id = ?2)
            ORDER BY created_at DESC, rowid DESC
            "#,
        )?;
        let rows = stmt.query_map(params![clinician_id, patient_id], read_message_row)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?.try_into()?);
        }
        Ok(messages)
    }

    /// Mark a message read if it belongs to the patient.
    ///
    /// Returns false when no such message exists for that patient.
    pub fn mark_message_read(
        &self,
        message_id: &str,
        patient_id: &str,
        at: &DateTime<Utc>,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE messages SET read = 1, read_at = COALESCE(read_at, ?3)
            WHERE message_id = ?1 AND patient_id = ?2
            "#,
            params![message_id, patient_id, ts_to_sql(at)],
        )?;
        Ok(rows_affected > 0)
    }

    // =========================================================================
    // Notes
    // =========================================================================

    /// Insert a new patient note.
    pub fn insert_note(&self, note: &PatientNote) -> DbResult<()> {
        let tags_json = serde_json::to_string(&note.tags)?;
        self.conn
            .execute(
                r#"
                INSERT INTO patient_notes (
                    note_id, patient_id, clinician_id, content, tags, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    note.note_id,
                    note.patient_id,
                    note.clinician_id,
                    note.content,
                    tags_json,
                    ts_to_sql(&note.created_at),
                    ts_to_sql(&note.updated_at),
                ],
            )
            .map_err(|e| DbError::from_write(e, &format!("note for patient {}", note.patient_id)))?;
        Ok(())
    }

    /// Notes on a patient, newest first.
    pub fn list_notes(&self, patient_id: &str) -> DbResult<Vec<PatientNote>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT note_id, patient_id, clinician_id, content, tags, created_at, updated_at
            FROM patient_notes
            WHERE patient_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )?;
        let rows = stmt.query_map([patient_id], |row| {
            Ok(NoteRow {
                note_id: row.get(0)?,
                patient_id: row.get(1)?,
                clinician_id: row.get(2)?,
                content: row.get(3)?,
                tags: row.get(4)?,
                created_at: row.get(5)?,
                updated_at: row.get(6)?,
            })
        })?;

        let mut notes = Vec::new();
        for row in rows {
            notes.push(row?.try_into()?);
        }
        Ok(notes)
    }

    // =========================================================================
    // Follow-ups
    // =========================================================================

    /// Insert a new follow-up.
    pub fn insert_follow_up(&self, follow_up: &FollowUp) -> DbResult<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO follow_ups (
                    follow_up_id, patient_id, clinician_id, scheduled_for, reminder_days,
                    notes, status, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    follow_up.follow_up_id,
                    follow_up.patient_id,
                    follow_up.clinician_id,
                    follow_up.scheduled_for.format(FOLLOW_UP_FORMAT).to_string(),
                    follow_up.reminder_days,
                    follow_up.notes,
                    follow_up.status.as_str(),
                    ts_to_sql(&follow_up.created_at),
                    ts_to_sql(&follow_up.updated_at),
                ],
            )
            .map_err(|e| {
                DbError::from_write(e, &format!("follow-up for patient {}", follow_up.patient_id))
            })?;
        Ok(())
    }

    /// Follow-ups, soonest first. Optionally restricted to one patient.
    pub fn list_follow_ups(&self, patient_id: Option<&str>) -> DbResult<Vec<FollowUp>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT follow_up_id, patient_id, clinician_id, scheduled_for, reminder_days,
                   notes, status, created_at, updated_at
            FROM follow_ups
            WHERE ?1 IS NULL OR patient_id = ?1
            ORDER BY scheduled_for ASC, rowid ASC
            "#,
        )?;
        let rows = stmt.query_map([patient_id], |row| {
            Ok(FollowUpRow {
                follow_up_id: row.get(0)?,
                patient_id: row.get(1)?,
                clinician_id: row.get(2)?,
                scheduled_for: row.get(3)?,
                reminder_days: row.get(4)?,
                notes: row.get(5)?,
                status: row.get(6)?,
                created_at: row.get(7)?,
                updated_at: row.get(8)?,
            })
        })?;

        let mut follow_ups = Vec::new();
        for row in rows {
            follow_ups.push(row?.try_into()?);
        }
        Ok(follow_ups)
    }

    /// Change a follow-up's status.
    pub fn update_follow_up_status(
        &self,
        follow_up_id: &str,
        status: FollowUpStatus,
        at: &DateTime<Utc>,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE follow_ups SET status = ?2, updated_at = ?3 WHERE follow_up_id = ?1",
            params![follow_up_id, status.as_str(), ts_to_sql(at)],
        )?;
        Ok(rows_affected > 0)
    }

    // =========================================================================
    // Reports
    // =========================================================================

    /// Record report metadata.
    pub fn insert_report(&self, report: &Report) -> DbResult<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO reports (
                    report_id, patient_id, clinician_id, prediction_id, report_type,
                    file_path, email_sent, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    report.report_id,
                    report.patient_id,
                    report.clinician_id,
                    report.prediction_id,
                    report.report_type,
                    report.file_path,
                    report.email_sent,
                    ts_to_sql(&report.created_at),
                ],
            )
            .map_err(|e| DbError::from_write(e, &format!("report for {}", report.prediction_id)))?;
        Ok(())
    }

    /// Report history for a patient, newest first.
    pub fn list_reports(&self, patient_id: &str) -> DbResult<Vec<Report>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT report_id, patient_id, clinician_id, prediction_id, report_type,
                   file_path, email_sent, created_at
            FROM reports
            WHERE patient_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )?;
        let rows = stmt.query_map([patient_id], |row| {
            Ok(ReportRow {
                report_id: row.get(0)?,
                patient_id: row.get(1)?,
                clinician_id: row.get(2)?,
                prediction_id: row.get(3)?,
                report_type: row.get(4)?,
                file_path: row.get(5)?,
                email_sent: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;

        let mut reports = Vec::new();
        for row in rows {
            reports.push(row?.try_into()?);
        }
        Ok(reports)
    }
}

/// Intermediate row structs for database mapping.
struct MessageRow {
    message_id: String,
    patient_id: String,
    clinician_id: String,
    content: String,
    kind: String,
    read: bool,
    created_at: String,
    read_at: Option<String>,
}

fn read_message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        message_id: row.get(0)?,
        patient_id: row.get(1)?,
        clinician_id: row.get(2)?,
        content: row.get(3)?,
        kind: row.get(4)?,
        read: row.get(5)?,
        created_at: row.get(6)?,
        read_at: row.get(7)?,
    })
}

impl TryFrom<MessageRow> for Message {
    type Error = DbError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "instruction" => MessageKind::Instruction,
            other => return Err(DbError::Constraint(format!("Unknown message kind: {}", other))),
        };
        Ok(Message {
            message_id: row.message_id,
            patient_id: row.patient_id,
            clinician_id: row.clinician_id,
            content: row.content,
            kind,
            read: row.read,
            created_at: ts_from_sql(&row.created_at)?,
            read_at: row.read_at.as_deref().map(ts_from_sql).transpose()?,
        })
    }
}

struct NoteRow {
    note_id: String,
    patient_id: String,
    clinician_id: String,
    content: String,
    tags: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<NoteRow> for PatientNote {
    type Error = DbError;

    fn try_from(row: NoteRow) -> Result<Self, Self::Error> {
        Ok(PatientNote {
            note_id: row.note_id,
            patient_id: row.patient_id,
            clinician_id: row.clinician_id,
            content: row.content,
            tags: serde_json::from_str(&row.tags)?,
            created_at: ts_from_sql(&row.created_at)?,
            updated_at: ts_from_sql(&row.updated_at)?,
        })
    }
}

struct FollowUpRow {
    follow_up_id: String,
    patient_id: String,
    clinician_id: String,
    scheduled_for: String,
    reminder_days: u32,
    notes: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<FollowUpRow> for FollowUp {
    type Error = DbError;

    fn try_from(row: FollowUpRow) -> Result<Self, Self::Error> {
        let scheduled_for = NaiveDateTime::parse_from_str(&row.scheduled_for, FOLLOW_UP_FORMAT)
            .map_err(|e| {
                DbError::Constraint(format!("Bad follow-up time {:?}: {}", row.scheduled_for, e))
            })?;
        Ok(FollowUp {
            follow_up_id: row.follow_up_id,
            patient_id: row.patient_id,
            clinician_id: row.clinician_id,
            scheduled_for,
            reminder_days: row.reminder_days,
            notes: row.notes,
            status: row.status.parse().map_err(DbError::Constraint)?,
            created_at: ts_from_sql(&row.created_at)?,
            updated_at: ts_from_sql(&row.updated_at)?,
        })
    }
}

struct ReportRow {
    report_id: String,
    patient_id: String,
    clinician_id: Option<String>,
    prediction_id: String,
    report_type: String,
    file_path: String,
    email_sent: bool,
    created_at: String,
}

impl TryFrom<ReportRow> for Report {
    type Error = DbError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        Ok(Report {
            report_id: row.report_id,
            patient_id: row.patient_id,
            clinician_id: row.clinician_id,
            prediction_id: row.prediction_id,
            report_type: row.report_type,
            file_path: row.file_path,
            email_sent: row.email_sent,
            created_at: ts_from_sql(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Clinician, Patient};
    use chrono::NaiveDate;

    fn setup_db() -> (Database, Patient, Clinician) {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Asha".into(), "asha@example.com".into());
        let clinician = Clinician::new("Dr. Rao".into(), "rao@clinic.org".into());
        db.insert_patient(&patient).unwrap();
        db.insert_clinician(&clinician).unwrap();
        (db, patient, clinician)
    }

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_messages_round_trip_and_read() {
        let (db, patient, clinician) = setup_db();
        let msg = Message::new(
            patient.patient_id.clone(),
            clinician.clinician_id.clone(),
            "Reduce salt".into(),
        );
        db.insert_message(&msg).unwrap();

        assert_eq!(db.get_message(&msg.message_id).unwrap().unwrap(), msg);

        // Only the owning patient can mark it read
        let now = crate::models::now();
        assert!(!db.mark_message_read(&msg.message_id, "PAT_other", &now).unwrap());
        assert!(db.mark_message_read(&msg.message_id, &patient.patient_id, &now).unwrap());

        let stored = db.get_message(&msg.message_id).unwrap().unwrap();
        assert!(stored.read);
        assert_eq!(stored.read_at, Some(now));
    }

    #[test]
    fn test_messages_for_clinician_filtered_by_patient() {
        let (db, patient, clinician) = setup_db();
        let other = Patient::new("Ben".into(), "ben@example.com".into());
        db.insert_patient(&other).unwrap();

        for pid in [&patient.patient_id, &other.patient_id] {
            db.insert_message(&Message::new(
                pid.clone(),
                clinician.clinician_id.clone(),
                "Hello".into(),
            ))
            .unwrap();
        }

        assert_eq!(
            db.list_messages_for_clinician(&clinician.clinician_id, None)
                .unwrap()
                .len(),
            2
        );
        let only = db
            .list_messages_for_clinician(&clinician.clinician_id, Some(&other.patient_id))
            .unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].patient_id, other.patient_id);
        assert_eq!(db.list_messages_for_patient(&patient.patient_id).unwrap().len(), 1);
    }

    #[test]
    fn test_notes_require_patient() {
        let (db, patient, clinician) = setup_db();
        let note = PatientNote::new(
            patient.patient_id.clone(),
            clinician.clinician_id.clone(),
            "Stable".into(),
            vec!["review".into()],
        );
        db.insert_note(&note).unwrap();
        assert_eq!(db.list_notes(&patient.patient_id).unwrap(), vec![note]);

        let orphan = PatientNote::new("PAT_missing".into(), clinician.clinician_id, "x".into(), vec![]);
        assert!(matches!(
            db.insert_note(&orphan),
            Err(DbError::MissingReference(_))
        ));
    }

    #[test]
    fn test_follow_ups_sorted_by_schedule() {
        let (db, patient, clinician) = setup_db();
        let later = FollowUp::new(
            patient.patient_id.clone(),
            clinician.clinician_id.clone(),
            at(20, 9),
            7,
            String::new(),
        );
        let sooner = FollowUp::new(
            patient.patient_id.clone(),
            clinician.clinician_id.clone(),
            at(5, 14),
            3,
            "Bring lab results".into(),
        );
        db.insert_follow_up(&later).unwrap();
        db.insert_follow_up(&sooner).unwrap();

        let listed = db.list_follow_ups(Some(&patient.patient_id)).unwrap();
        assert_eq!(listed, vec![sooner.clone(), later.clone()]);
        assert_eq!(db.list_follow_ups(None).unwrap().len(), 2);

        assert!(db
            .update_follow_up_status(&sooner.follow_up_id, FollowUpStatus::Completed, &crate::models::now())
            .unwrap());
        let listed = db.list_follow_ups(None).unwrap();
        assert_eq!(listed[0].status, FollowUpStatus::Completed);
    }
}
