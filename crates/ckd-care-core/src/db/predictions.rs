//! Prediction database operations. Predictions are insert-only.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, ToSql};
use serde::Serialize;

use super::{ts_from_sql, ts_to_sql, Database, DbError, DbResult};
use crate::models::{
    decode_f64s, encode_f64s, CkdStage, FeatureSnapshot, Prediction, PredictionResult, RiskLevel,
};

/// Filter over stored predictions. Every bound is optional and inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PredictionFilter {
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub stage: Option<CkdStage>,
    pub ckd_binary: Option<bool>,
}

impl PredictionFilter {
    fn sql_params(&self) -> [Box<dyn ToSql>; 4] {
        [
            Box::new(self.created_from.as_ref().map(ts_to_sql)),
            Box::new(self.created_to.as_ref().map(ts_to_sql)),
            Box::new(self.stage.map(|s| s.as_str())),
            Box::new(self.ckd_binary),
        ]
    }

    fn with_binary(&self, ckd_binary: bool) -> Self {
        Self {
            ckd_binary: Some(ckd_binary),
            ..self.clone()
        }
    }
}

const FILTER_CLAUSE: &str = r#"
    (?1 IS NULL OR created_at >= ?1)
    AND (?2 IS NULL OR created_at <= ?2)
    AND (?3 IS NULL OR ckd_stage = ?3)
    AND (?4 IS NULL OR ckd_binary = ?4)
"#;

const SELECT_COLUMNS: &str = r#"
    SELECT prediction_id, patient_id, clinician_id, feature_names, feature_values,
           model_input, input_digest, ckd_binary, ckd_stage, confidence, risk_level,
           attribution, model_used, created_at
    FROM predictions
"#;

impl Database {
    /// Insert a new prediction. Unknown patient is a `MissingReference`.
    pub fn insert_prediction(&self, prediction: &Prediction) -> DbResult<()> {
        let names_json = serde_json::to_string(&prediction.input.names)?;
        let attribution_json = prediction
            .attribution
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .execute(
                r#"
                INSERT INTO predictions (
                    prediction_id, patient_id, clinician_id, feature_names, feature_values,
                    model_input, input_digest, ckd_binary, ckd_stage, confidence, risk_level,
                    attribution, model_used, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                "#,
                params![
                    prediction.prediction_id,
                    prediction.patient_id,
                    prediction.clinician_id,
                    names_json,
                    encode_f64s(&prediction.input.values),
                    encode_f64s(&prediction.input.model_input),
                    prediction.input_digest,
                    prediction.result.ckd_binary,
                    prediction.result.ckd_stage.as_str(),
                    prediction.result.confidence,
                    prediction.result.risk_level.as_str(),
                    attribution_json,
                    prediction.model_used,
                    ts_to_sql(&prediction.created_at),
                ],
            )
            .map_err(|e| {
                DbError::from_write(e, &format!("prediction for patient {}", prediction.patient_id))
            })?;
        Ok(())
    }

    /// Get a prediction by ID.
    pub fn get_prediction(&self, prediction_id: &str) -> DbResult<Option<Prediction>> {
        let sql = format!("{} WHERE prediction_id = ?", SELECT_COLUMNS);
        self.conn
            .query_row(&sql, [prediction_id], read_prediction_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// The most recent prediction for a patient. Timestamp ties go to the
    /// later insert.
    pub fn latest_prediction(&self, patient_id: &str) -> DbResult<Option<Prediction>> {
        Ok(self
            .recent_predictions_for_patient(patient_id, 1)?
            .into_iter()
            .next())
    }

    /// Up to `limit` predictions for a patient, newest first.
    pub fn recent_predictions_for_patient(
        &self,
        patient_id: &str,
        limit: usize,
    ) -> DbResult<Vec<Prediction>> {
        let sql = format!(
            "{} WHERE patient_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            SELECT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![patient_id, limit as i64], read_prediction_row)?;

        let mut predictions = Vec::new();
        for row in rows {
            predictions.push(row?.try_into()?);
        }
        Ok(predictions)
    }

    /// Every prediction for a patient, oldest first.
    pub fn prediction_history(&self, patient_id: &str) -> DbResult<Vec<Prediction>> {
        let sql = format!(
            "{} WHERE patient_id = ? ORDER BY created_at ASC, rowid ASC",
            SELECT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], read_prediction_row)?;

        let mut predictions = Vec::new();
        for row in rows {
            predictions.push(row?.try_into()?);
        }
        Ok(predictions)
    }

    /// Number of predictions matching the filter.
    pub fn count_predictions(&self, filter: &PredictionFilter) -> DbResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM predictions WHERE {}", FILTER_CLAUSE);
        let params = filter.sql_params();
        let count: i64 = self.conn.query_row(
            &sql,
            rusqlite::params_from_iter(params.iter()),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Positive and negative prediction counts under the filter.
    pub fn count_predictions_by_flag(&self, filter: &PredictionFilter) -> DbResult<(u64, u64)> {
        Ok((
            self.count_predictions(&filter.with_binary(true))?,
            self.count_predictions(&filter.with_binary(false))?,
        ))
    }

    /// Prediction counts grouped by stored stage.
    pub fn count_predictions_by_stage(
        &self,
        filter: &PredictionFilter,
    ) -> DbResult<Vec<(CkdStage, u64)>> {
        self.grouped_counts("ckd_stage", filter)?
            .into_iter()
            .map(|(label, count)| Ok((string_to_stage(&label)?, count)))
            .collect()
    }

    /// Prediction counts grouped by stored risk band.
    pub fn count_predictions_by_risk(
        &self,
        filter: &PredictionFilter,
    ) -> DbResult<Vec<(RiskLevel, u64)>> {
        self.grouped_counts("risk_level", filter)?
            .into_iter()
            .map(|(label, count)| Ok((string_to_risk(&label)?, count)))
            .collect()
    }

    fn grouped_counts(
        &self,
        column: &'static str,
        filter: &PredictionFilter,
    ) -> DbResult<Vec<(String, u64)>> {
        let sql = format!(
            "SELECT {col}, COUNT(*) FROM predictions WHERE {clause} GROUP BY {col} ORDER BY {col}",
            col = column,
            clause = FILTER_CLAUSE
        );
        let params = filter.sql_params();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Up to `limit` predictions matching the filter, newest first.
    pub fn recent_predictions(
        &self,
        filter: &PredictionFilter,
        limit: usize,
    ) -> DbResult<Vec<Prediction>> {
        let sql = format!(
            "{} WHERE {} ORDER BY created_at DESC, rowid DESC LIMIT {}",
            SELECT_COLUMNS, FILTER_CLAUSE, limit
        );
        let params = filter.sql_params();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), read_prediction_row)?;

        let mut predictions = Vec::new();
        for row in rows {
            predictions.push(row?.try_into()?);
        }
        Ok(predictions)
    }
}

/// Intermediate row struct for database mapping.
pub(crate) struct PredictionRow {
    prediction_id: String,
    patient_id: String,
    clinician_id: Option<String>,
    feature_names: String,
    feature_values: Vec<u8>,
    model_input: Vec<u8>,
    input_digest: String,
    ckd_binary: bool,
    ckd_stage: String,
    confidence: f64,
    risk_level: String,
    attribution: Option<String>,
    model_used: String,
    created_at: String,
}

/// Read a prediction row whose columns start at `offset`.
pub(crate) fn read_prediction_columns(row: &Row<'_>, offset: usize) -> rusqlite::Result<PredictionRow> {
    Ok(PredictionRow {
        prediction_id: row.get(offset)?,
        patient_id: row.get(offset + 1)?,
        clinician_id: row.get(offset + 2)?,
        feature_names: row.get(offset + 3)?,
        feature_values: row.get(offset + 4)?,
        model_input: row.get(offset + 5)?,
        input_digest: row.get(offset + 6)?,
        ckd_binary: row.get(offset + 7)?,
        ckd_stage: row.get(offset + 8)?,
        confidence: row.get(offset + 9)?,
        risk_level: row.get(offset + 10)?,
        attribution: row.get(offset + 11)?,
        model_used: row.get(offset + 12)?,
        created_at: row.get(offset + 13)?,
    })
}

fn read_prediction_row(row: &Row<'_>) -> rusqlite::Result<PredictionRow> {
    read_prediction_columns(row, 0)
}

impl TryFrom<PredictionRow> for Prediction {
    type Error = DbError;

    fn try_from(row: PredictionRow) -> Result<Self, Self::Error> {
        let names: Vec<String> = serde_json::from_str(&row.feature_names)?;
        let values = decode_f64s(&row.feature_values).ok_or_else(|| {
            DbError::Constraint(format!("Corrupt feature values in {}", row.prediction_id))
        })?;
        let model_input = decode_f64s(&row.model_input).ok_or_else(|| {
            DbError::Constraint(format!("Corrupt model input in {}", row.prediction_id))
        })?;
        if names.len() != values.len() {
            return Err(DbError::Constraint(format!(
                "Snapshot of {} has {} names but {} values",
                row.prediction_id,
                names.len(),
                values.len()
            )));
        }
        let attribution: Option<Vec<f64>> = row
            .attribution
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Prediction {
            prediction_id: row.prediction_id,
            patient_id: row.patient_id,
            clinician_id: row.clinician_id,
            input: FeatureSnapshot {
                names,
                values,
                model_input,
            },
            result: PredictionResult {
                ckd_binary: row.ckd_binary,
                ckd_stage: string_to_stage(&row.ckd_stage)?,
                confidence: row.confidence,
                risk_level: string_to_risk(&row.risk_level)?,
            },
            attribution,
            model_used: row.model_used,
            input_digest: row.input_digest,
            created_at: ts_from_sql(&row.created_at)?,
        })
    }
}

fn string_to_stage(s: &str) -> Result<CkdStage, DbError> {
    s.parse()
        .map_err(|_| DbError::Constraint(format!("Unknown CKD stage: {}", s)))
}

fn string_to_risk(s: &str) -> Result<RiskLevel, DbError> {
    s.parse()
        .map_err(|_| DbError::Constraint(format!("Unknown risk level: {}", s)))
}
