//! Discrete labels shared across predictions, queries and analytics.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label parsing errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LabelError {
    #[error("Unknown CKD stage: {0}")]
    UnknownStage(String),

    #[error("Unknown risk level: {0}")]
    UnknownRisk(String),

    #[error("Unknown gender: {0}")]
    UnknownGender(String),

    #[error("Unsupported language: {0}")]
    UnknownLanguage(String),
}

/// Current UTC time at the precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Kidney function stage derived from the filtration rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CkdStage {
    #[serde(rename = "Stage 1")]
    Stage1,
    #[serde(rename = "Stage 2")]
    Stage2,
    #[serde(rename = "Stage 3")]
    Stage3,
    #[serde(rename = "Stage 4")]
    Stage4,
    #[serde(rename = "Stage 5")]
    Stage5,
}

impl CkdStage {
    pub const ALL: [CkdStage; 5] = [
        CkdStage::Stage1,
        CkdStage::Stage2,
        CkdStage::Stage3,
        CkdStage::Stage4,
        CkdStage::Stage5,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CkdStage::Stage1 => "Stage 1",
            CkdStage::Stage2 => "Stage 2",
            CkdStage::Stage3 => "Stage 3",
            CkdStage::Stage4 => "Stage 4",
            CkdStage::Stage5 => "Stage 5",
        }
    }
}

impl fmt::Display for CkdStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CkdStage {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CkdStage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s.trim())
            .ok_or_else(|| LabelError::UnknownStage(s.to_string()))
    }
}

/// Risk band derived from classifier confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::High, RiskLevel::Medium, RiskLevel::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "High",
            RiskLevel::Medium => "Medium",
            RiskLevel::Low => "Low",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RiskLevel::ALL
            .iter()
            .copied()
            .find(|risk| risk.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LabelError::UnknownRisk(s.to_string()))
    }
}

/// Patient gender as recorded at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    M,
    F,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::M => "M",
            Gender::F => "F",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "M" | "m" => Ok(Gender::M),
            "F" | "f" => Ok(Gender::F),
            other => Err(LabelError::UnknownGender(other.to_string())),
        }
    }
}

/// Stage label used for recommendation plans and the status filter:
/// either "No CKD" or one of the five stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StageLabel {
    NoCkd,
    Ckd(CkdStage),
}

impl StageLabel {
    pub const NO_CKD: &'static str = "No CKD";

    pub fn as_str(&self) -> &'static str {
        match self {
            StageLabel::NoCkd => Self::NO_CKD,
            StageLabel::Ckd(stage) => stage.as_str(),
        }
    }
}

impl fmt::Display for StageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageLabel {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == Self::NO_CKD {
            return Ok(StageLabel::NoCkd);
        }
        s.parse().map(StageLabel::Ckd)
    }
}

impl From<CkdStage> for StageLabel {
    fn from(stage: CkdStage) -> Self {
        StageLabel::Ckd(stage)
    }
}

impl TryFrom<String> for StageLabel {
    type Error = LabelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<StageLabel> for String {
    fn from(label: StageLabel) -> Self {
        label.as_str().to_string()
    }
}

/// Presentation label computed from a patient's latest prediction.
///
/// Uses the binary classifier flag: a negative flag is "Healthy" whatever
/// the filtration-rate stage says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum HealthStatus {
    /// No prediction on record
    Unknown,
    /// Latest prediction has a negative CKD flag
    Healthy,
    /// Latest prediction has a positive CKD flag, with its stored stage
    Ckd(CkdStage),
}

impl HealthStatus {
    /// Whether this status satisfies a "No CKD" / "Stage N" filter.
    pub fn matches(&self, filter: StageLabel) -> bool {
        match (self, filter) {
            (HealthStatus::Healthy, StageLabel::NoCkd) => true,
            (HealthStatus::Ckd(stage), StageLabel::Ckd(wanted)) => *stage == wanted,
            _ => false,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Unknown => f.write_str("Unknown"),
            HealthStatus::Healthy => f.write_str("Healthy"),
            HealthStatus::Ckd(stage) => write!(f, "CKD {}", stage),
        }
    }
}

impl From<HealthStatus> for String {
    fn from(status: HealthStatus) -> Self {
        status.to_string()
    }
}

/// Presentation language threaded through recommendation calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "kn")]
    Kannada,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Kannada => "kn",
        }
    }
}

impl FromStr for Language {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::English),
            "kn" => Ok(Language::Kannada),
            other => Err(LabelError::UnknownLanguage(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_round_trip() {
        for stage in CkdStage::ALL {
            assert_eq!(stage.as_str().parse::<CkdStage>().unwrap(), stage);
        }
        assert!("Stage 6".parse::<CkdStage>().is_err());
        assert!("stage 1".parse::<CkdStage>().is_err());
    }

    #[test]
    fn test_stage_serde_label() {
        let json = serde_json::to_string(&CkdStage::Stage3).unwrap();
        assert_eq!(json, "\"Stage 3\"");
    }

    #[test]
    fn test_stage_label_parse() {
        assert_eq!("No CKD".parse::<StageLabel>().unwrap(), StageLabel::NoCkd);
        assert_eq!(
            "Stage 4".parse::<StageLabel>().unwrap(),
            StageLabel::Ckd(CkdStage::Stage4)
        );
        assert!("Healthy".parse::<StageLabel>().is_err());

        let json = serde_json::to_string(&StageLabel::NoCkd).unwrap();
        assert_eq!(json, "\"No CKD\"");
        let back: StageLabel = serde_json::from_str("\"Stage 2\"").unwrap();
        assert_eq!(back, StageLabel::Ckd(CkdStage::Stage2));
    }

    #[test]
    fn test_health_status_display_and_match() {
        assert_eq!(HealthStatus::Ckd(CkdStage::Stage2).to_string(), "CKD Stage 2");
        assert_eq!(HealthStatus::Healthy.to_string(), "Healthy");

        assert!(HealthStatus::Healthy.matches(StageLabel::NoCkd));
        assert!(HealthStatus::Ckd(CkdStage::Stage2).matches(StageLabel::Ckd(CkdStage::Stage2)));
        assert!(!HealthStatus::Ckd(CkdStage::Stage2).matches(StageLabel::Ckd(CkdStage::Stage3)));
        assert!(!HealthStatus::Unknown.matches(StageLabel::NoCkd));
    }

    #[test]
    fn test_gender_and_risk_parse() {
        assert_eq!("M".parse::<Gender>().unwrap(), Gender::M);
        assert_eq!(" f ".parse::<Gender>().unwrap(), Gender::F);
        assert!("X".parse::<Gender>().is_err());

        assert_eq!("high".parse::<RiskLevel>().unwrap(), RiskLevel::High);
        assert!("Severe".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn test_language() {
        assert_eq!(Language::default(), Language::English);
        assert_eq!("KN".parse::<Language>().unwrap(), Language::Kannada);
        assert_eq!(serde_json::to_string(&Language::Kannada).unwrap(), "\"kn\"");
    }

    #[test]
    fn test_now_is_microsecond_precision() {
        assert_eq!(now().timestamp_subsec_nanos() % 1_000, 0);
    }
}
