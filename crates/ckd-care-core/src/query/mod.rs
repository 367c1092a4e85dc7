//! Patient query engine.
//!
//! Filter patients by text and gender, join each with its latest
//! prediction, post-filter on the joined view (status, risk, join date),
//! then paginate. Patients are ordered by join date, newest first.

mod filter;

pub use filter::*;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use crate::db::{Database, PatientOverview};
use crate::models::{Gender, HealthStatus, RiskLevel};
use crate::CareResult;

/// One row of the patient list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientSummary {
    pub patient_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub tags: BTreeSet<String>,
    /// From the latest prediction's binary flag
    pub health_status: HealthStatus,
    pub risk_level: Option<RiskLevel>,
    pub last_prediction_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<PatientOverview> for PatientSummary {
    fn from(overview: PatientOverview) -> Self {
        let PatientOverview { patient, latest } = overview;
        let health_status = latest
            .as_ref()
            .map_or(HealthStatus::Unknown, |p| p.health_status());
        Self {
            patient_id: patient.patient_id,
            name: patient.name,
            email: patient.email,
            phone: patient.phone,
            age: patient.age,
            gender: patient.gender,
            tags: patient.tags,
            health_status,
            risk_level: latest.as_ref().map(|p| p.result.risk_level),
            last_prediction_at: latest.as_ref().map(|p| p.created_at),
            created_at: patient.created_at,
        }
    }
}

/// Read-only patient queries over one database.
pub struct PatientQuery<'a> {
    db: &'a Database,
}

impl<'a> PatientQuery<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// One page of matching patients.
    pub fn run(&self, filter: &PatientFilter, page: PageRequest) -> CareResult<Page<PatientSummary>> {
        let all = self.matching(filter)?;
        let page = Page::slice(all, page);
        debug!(
            "Patient query matched {} (page {}/{})",
            page.total_count, page.page, page.total_pages
        );
        Ok(page)
    }

    /// Every matching patient, newest first.
    pub fn matching(&self, filter: &PatientFilter) -> CareResult<Vec<PatientSummary>> {
        let overviews = self.db.patient_overviews(filter.gender)?;
        Ok(overviews
            .into_iter()
            .filter(|o| {
                let p = &o.patient;
                filter.matches_text(&p.patient_id, &p.name, &p.email)
            })
            .map(PatientSummary::from)
            .filter(|s| matches_joined(filter, s))
            .collect())
    }
}

fn matches_joined(filter: &PatientFilter, summary: &PatientSummary) -> bool {
    if let Some(status) = filter.status {
        if !summary.health_status.matches(status) {
            return false;
        }
    }
    if let Some(risk) = filter.risk {
        if summary.risk_level != Some(risk) {
            return false;
        }
    }
    filter.matches_join_date(&summary.created_at)
}
