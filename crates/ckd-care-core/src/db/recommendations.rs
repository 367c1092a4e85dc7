//! Recommendation database operations.

use rusqlite::{params, OptionalExtension};

use super::{ts_from_sql, ts_to_sql, Database, DbError, DbResult};
use crate::models::Recommendation;

impl Database {
    /// Append a recommendation. Existing ones for the patient are kept.
    pub fn insert_recommendation(&self, rec: &Recommendation) -> DbResult<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO recommendations (
                    recommendation_id, patient_id, stage, diet_plan, exercise_plan,
                    lifestyle_tips, language, created_by, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    rec.recommendation_id,
                    rec.patient_id,
                    rec.stage.as_str(),
                    serde_json::to_string(&rec.diet_plan)?,
                    serde_json::to_string(&rec.exercise_plan)?,
                    serde_json::to_string(&rec.lifestyle_tips)?,
                    rec.language.code(),
                    rec.created_by.to_string(),
                    ts_to_sql(&rec.created_at),
                    ts_to_sql(&rec.updated_at),
                ],
            )
            .map_err(|e| {
                DbError::from_write(e, &format!("recommendation for patient {}", rec.patient_id))
            })?;
        Ok(())
    }

    /// The most recently created recommendation for a patient.
    pub fn latest_recommendation(&self, patient_id: &str) -> DbResult<Option<Recommendation>> {
        self.conn
            .query_row(
                r#"
                SELECT recommendation_id, patient_id, stage, diet_plan, exercise_plan,
                       lifestyle_tips, language, created_by, created_at, updated_at
                FROM recommendations
                WHERE patient_id = ?
                ORDER BY created_at DESC, rowid DESC
                LIMIT 1
                "#,
                [patient_id],
                |row| {
                    Ok(RecommendationRow {
                        recommendation_id: row.get(0)?,
                        patient_id: row.get(1)?,
                        stage: row.get(2)?,
                        diet_plan: row.get(3)?,
                        exercise_plan: row.get(4)?,
                        lifestyle_tips: row.get(5)?,
                        language: row.get(6)?,
                        created_by: row.get(7)?,
                        created_at: row.get(8)?,
                        updated_at: row.get(9)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Number of recommendations stored for a patient.
    pub fn count_recommendations(&self, patient_id: &str) -> DbResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM recommendations WHERE patient_id = ?",
            [patient_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Intermediate row struct for database mapping.
struct RecommendationRow {
    recommendation_id: String,
    patient_id: String,
    stage: String,
    diet_plan: String,
    exercise_plan: String,
    lifestyle_tips: String,
    language: String,
    created_by: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<RecommendationRow> for Recommendation {
    type Error = DbError;

    fn try_from(row: RecommendationRow) -> Result<Self, Self::Error> {
        Ok(Recommendation {
            recommendation_id: row.recommendation_id,
            patient_id: row.patient_id,
            stage: row
                .stage
                .parse()
                .map_err(|_| DbError::Constraint(format!("Unknown stage label: {}", row.stage)))?,
            diet_plan: serde_json::from_str(&row.diet_plan)?,
            exercise_plan: serde_json::from_str(&row.exercise_plan)?,
            lifestyle_tips: serde_json::from_str(&row.lifestyle_tips)?,
            language: row
                .language
                .parse()
                .map_err(|_| DbError::Constraint(format!("Unknown language: {}", row.language)))?,
            created_by: row.created_by.parse().map_err(DbError::Constraint)?,
            created_at: ts_from_sql(&row.created_at)?,
            updated_at: ts_from_sql(&row.updated_at)?,
        })
    }
}
