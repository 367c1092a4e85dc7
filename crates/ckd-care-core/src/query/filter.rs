//! Filter and pagination parameters for the patient query engine.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::models::{Gender, RiskLevel, StageLabel};
use crate::CareError;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page size used when the caller gives none.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Filters as received from a caller: every field is free text and may be
/// blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    pub search: Option<String>,
    pub gender: Option<String>,
    /// "No CKD" or "Stage 1".."Stage 5"
    pub stage: Option<String>,
    pub risk: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

/// Validated patient filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientFilter {
    /// Lowercased literal substring matched against id, name and email
    pub search: Option<String>,
    pub gender: Option<Gender>,
    /// Matched against the latest prediction's health status
    pub status: Option<StageLabel>,
    pub risk: Option<RiskLevel>,
    /// Inclusive bounds on the patient join date
    pub joined_from: Option<DateTime<Utc>>,
    pub joined_to: Option<DateTime<Utc>>,
}

impl TryFrom<&FilterParams> for PatientFilter {
    type Error = CareError;

    fn try_from(params: &FilterParams) -> Result<Self, Self::Error> {
        let gender = present(&params.gender)
            .map(|g| g.parse::<Gender>())
            .transpose()?;
        let status = present(&params.stage)
            .filter(|s| !s.eq_ignore_ascii_case("all"))
            .map(|s| s.parse::<StageLabel>())
            .transpose()?;
        let risk = present(&params.risk)
            .filter(|r| !r.eq_ignore_ascii_case("all"))
            .map(|r| r.parse::<RiskLevel>())
            .transpose()?;

        Ok(Self {
            search: present(&params.search).map(str::to_lowercase),
            gender,
            status,
            risk,
            joined_from: date_bound("date_from", params.date_from.as_deref()),
            joined_to: date_bound("date_to", params.date_to.as_deref()),
        })
    }
}

impl PatientFilter {
    /// Whether the patient's id, name or email contains the search text.
    pub fn matches_text(&self, patient_id: &str, name: &str, email: &str) -> bool {
        match &self.search {
            None => true,
            Some(needle) => [patient_id, name, email]
                .iter()
                .any(|field| field.to_lowercase().contains(needle.as_str())),
        }
    }

    /// Whether a join date falls within the inclusive bounds.
    pub fn matches_join_date(&self, joined: &DateTime<Utc>) -> bool {
        self.joined_from.map_or(true, |from| *joined >= from)
            && self.joined_to.map_or(true, |to| *joined <= to)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Parse a date bound leniently.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]` (UTC) and `YYYY-MM-DD`
/// (midnight UTC). Anything else is logged and ignored.
pub fn parse_date_bound(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

pub(crate) fn date_bound(field: &str, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.map(str::trim).filter(|r| !r.is_empty())?;
    let parsed = parse_date_bound(raw);
    if parsed.is_none() {
        warn!("Ignoring unparseable {} filter: {:?}", field, raw);
    }
    parsed
}

// =========================================================================
// Pagination
// =========================================================================

/// A 1-based page request. Deserialization goes through [`PageRequest::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPageRequest")]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Page request as it arrives on the wire, before validation.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawPageRequest {
    page: u32,
    page_size: u32,
}

impl Default for RawPageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl TryFrom<RawPageRequest> for PageRequest {
    type Error = CareError;

    fn try_from(raw: RawPageRequest) -> Result<Self, Self::Error> {
        PageRequest::new(raw.page, raw.page_size)
    }
}

impl PageRequest {
    /// Validate a page request: `page >= 1`, `1 <= page_size <= 100`.
    pub fn new(page: u32, page_size: u32) -> Result<Self, CareError> {
        if page == 0 {
            return Err(CareError::Validation("page must be at least 1".into()));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(CareError::Validation(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(Self { page, page_size })
    }

    /// Clamp arbitrary values into range instead of rejecting them.
    pub fn clamped(page: i64, page_size: i64) -> Self {
        Self {
            page: page.clamp(1, u32::MAX as i64) as u32,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE as i64) as u32,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    fn offset(&self) -> usize {
        (self.page as usize)
            .saturating_sub(1)
            .saturating_mul(self.page_size as usize)
    }
}

/// One page of results plus the pagination summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub total_pages: u64,
    pub page: u32,
    pub page_size: u32,
    pub has_prev: bool,
    pub has_next: bool,
}

impl<T> Page<T> {
    /// Cut one page out of the complete, already sorted result set.
    pub fn slice(all: Vec<T>, request: PageRequest) -> Self {
        let total_count = all.len() as u64;
        let size = u64::from(request.page_size.max(1));
        let total_pages = (total_count + size - 1) / size;
        let items: Vec<T> = all
            .into_iter()
            .skip(request.offset())
            .take(size as usize)
            .collect();

        Self {
            items,
            total_count,
            total_pages,
            page: request.page,
            page_size: request.page_size,
            has_prev: request.page > 1,
            has_next: (request.page as u64) < total_pages,
        }
    }
}
