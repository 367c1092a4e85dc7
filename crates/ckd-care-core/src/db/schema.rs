//! SQLite schema definition.

/// Complete database schema for the CKD care system.
///
/// Timestamps are always written by the application as fixed-width RFC 3339
/// UTC text, so `ORDER BY created_at` is chronological.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    patient_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    phone TEXT,
    age INTEGER CHECK (age IS NULL OR age >= 0),
    gender TEXT CHECK (gender IS NULL OR gender IN ('M', 'F')),
    address TEXT,
    emergency_contact TEXT,
    tags TEXT NOT NULL DEFAULT '[]',              -- JSON array of strings
    assigned_clinician_id TEXT REFERENCES clinicians(clinician_id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patients_created_at ON patients(created_at);
CREATE INDEX IF NOT EXISTS idx_patients_gender ON patients(gender);

-- ============================================================================
-- Clinicians
-- ============================================================================

CREATE TABLE IF NOT EXISTS clinicians (
    clinician_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    phone TEXT,
    specialization TEXT,
    patients_under_care TEXT NOT NULL DEFAULT '[]', -- JSON array of patient ids
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- ============================================================================
-- Predictions (append-only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS predictions (
    prediction_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    clinician_id TEXT,
    feature_names TEXT NOT NULL,                  -- JSON array, feature-contract order
    feature_values BLOB NOT NULL,                 -- little-endian f64, unscaled
    model_input BLOB NOT NULL,                    -- little-endian f64, as classified
    input_digest TEXT NOT NULL,                   -- SHA-256 hex of the snapshot
    ckd_binary INTEGER NOT NULL CHECK (ckd_binary IN (0, 1)),
    ckd_stage TEXT NOT NULL,
    confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
    risk_level TEXT NOT NULL CHECK (risk_level IN ('High', 'Medium', 'Low')),
    attribution TEXT,                             -- JSON array or NULL
    model_used TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_predictions_patient ON predictions(patient_id, created_at);
CREATE INDEX IF NOT EXISTS idx_predictions_created_at ON predictions(created_at);

CREATE TRIGGER IF NOT EXISTS predictions_no_update BEFORE UPDATE ON predictions BEGIN
    SELECT RAISE(ABORT, 'predictions are append-only');
END;

-- ============================================================================
-- Recommendations
-- ============================================================================

CREATE TABLE IF NOT EXISTS recommendations (
    recommendation_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    stage TEXT NOT NULL,
    diet_plan TEXT NOT NULL,                      -- JSON object
    exercise_plan TEXT NOT NULL,                  -- JSON object
    lifestyle_tips TEXT NOT NULL,                 -- JSON array of strings
    language TEXT NOT NULL,
    created_by TEXT NOT NULL,                     -- 'system' | 'clinician:<id>'
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_recommendations_patient ON recommendations(patient_id, created_at);

-- ============================================================================
-- Messages
-- ============================================================================

CREATE TABLE IF NOT EXISTS messages (
    message_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    clinician_id TEXT NOT NULL REFERENCES clinicians(clinician_id),
    content TEXT NOT NULL,
    kind TEXT NOT NULL DEFAULT 'instruction',
    read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    read_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_messages_patient ON messages(patient_id, created_at);
CREATE INDEX IF NOT EXISTS idx_messages_clinician ON messages(clinician_id, created_at);

-- ============================================================================
-- Notes, follow-ups, reports
-- ============================================================================

CREATE TABLE IF NOT EXISTS patient_notes (
    note_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    clinician_id TEXT NOT NULL REFERENCES clinicians(clinician_id),
    content TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notes_patient ON patient_notes(patient_id, created_at);

CREATE TABLE IF NOT EXISTS follow_ups (
    follow_up_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    clinician_id TEXT NOT NULL REFERENCES clinicians(clinician_id),
    scheduled_for TEXT NOT NULL,                  -- ISO local date-time
    reminder_days INTEGER NOT NULL DEFAULT 7 CHECK (reminder_days >= 0),
    notes TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'scheduled'
        CHECK (status IN ('scheduled', 'completed', 'cancelled', 'missed')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_follow_ups_scheduled ON follow_ups(scheduled_for);

CREATE TABLE IF NOT EXISTS reports (
    report_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    clinician_id TEXT,
    prediction_id TEXT NOT NULL REFERENCES predictions(prediction_id),
    report_type TEXT NOT NULL,
    file_path TEXT NOT NULL,
    email_sent INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reports_patient ON reports(patient_id, created_at);
"#;
