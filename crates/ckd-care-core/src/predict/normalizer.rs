//! Feature normalizer: raw clinical input → ordered numeric feature vector.
//!
//! ```text
//! ClinicalInput (loose numbers, gender code)
//!        │  coerce + one-hot gender
//!        ▼
//! ordered vector in feature-contract order (missing → 0)
//!        │  ScalingPlan: scale the fitted subset, pass the rest through
//!        ▼
//! classifier input
//! ```

use std::collections::HashMap;

use ckd_care_model::{ModelError, ModelResult, Scaler};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Feature name of the filtration rate used for stage derivation.
pub const FILTRATION_RATE_FEATURE: &str = "eGFR";

/// Feature name of the one-hot gender column.
pub const GENDER_FEATURE: &str = "gender_M";

/// The canonical clinical features, in training order.
pub const CANONICAL_FEATURES: [&str; 13] = [
    "age",
    "Blood_Pressure",
    "Sugar_Level",
    "Albumin",
    "Serum_Creatinine",
    "Sodium",
    "Potassium",
    "Hemoglobin",
    "BUN",
    "eGFR",
    "ACR",
    "UCR",
    "gender_M",
];

/// Normalization errors. All of them are caller-fixable.
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Field '{field}' is not a number: {value:?}")]
    NotNumeric { field: String, value: String },

    #[error("Field '{field}' must be a finite number")]
    NotFinite { field: String },

    #[error("Malformed clinical input: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A number that may arrive as a JSON number or as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseNumber {
    Number(f64),
    Text(String),
}

impl LooseNumber {
    /// Coerce to a finite float. Blank text counts as absent.
    pub fn coerce(&self, field: &str) -> Result<Option<f64>, NormalizeError> {
        let value = match self {
            LooseNumber::Number(n) => *n,
            LooseNumber::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                trimmed.parse::<f64>().map_err(|_| NormalizeError::NotNumeric {
                    field: field.to_string(),
                    value: text.clone(),
                })?
            }
        };
        if !value.is_finite() {
            return Err(NormalizeError::NotFinite {
                field: field.to_string(),
            });
        }
        Ok(Some(value))
    }
}

impl From<f64> for LooseNumber {
    fn from(n: f64) -> Self {
        LooseNumber::Number(n)
    }
}

impl From<&str> for LooseNumber {
    fn from(s: &str) -> Self {
        LooseNumber::Text(s.to_string())
    }
}

/// Raw clinical input. Every field is optional; unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClinicalInput {
    pub age: Option<LooseNumber>,
    pub blood_pressure: Option<LooseNumber>,
    pub sugar_level: Option<LooseNumber>,
    pub albumin: Option<LooseNumber>,
    pub serum_creatinine: Option<LooseNumber>,
    pub sodium: Option<LooseNumber>,
    pub potassium: Option<LooseNumber>,
    pub hemoglobin: Option<LooseNumber>,
    pub bun: Option<LooseNumber>,
    pub egfr: Option<LooseNumber>,
    pub acr: Option<LooseNumber>,
    pub ucr: Option<LooseNumber>,
    /// Gender code; "M" sets the one-hot column
    pub gender: Option<String>,
}

impl ClinicalInput {
    /// Parse from JSON, rejecting unknown keys.
    pub fn from_json(json: &str) -> Result<Self, NormalizeError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Numeric fields paired with their canonical feature names.
    fn numeric_fields(&self) -> [(&'static str, Option<&LooseNumber>); 12] {
        [
            ("age", self.age.as_ref()),
            ("Blood_Pressure", self.blood_pressure.as_ref()),
            ("Sugar_Level", self.sugar_level.as_ref()),
            ("Albumin", self.albumin.as_ref()),
            ("Serum_Creatinine", self.serum_creatinine.as_ref()),
            ("Sodium", self.sodium.as_ref()),
            ("Potassium", self.potassium.as_ref()),
            ("Hemoglobin", self.hemoglobin.as_ref()),
            ("BUN", self.bun.as_ref()),
            ("eGFR", self.egfr.as_ref()),
            ("ACR", self.acr.as_ref()),
            ("UCR", self.ucr.as_ref()),
        ]
    }

    /// Coerce every supplied field into canonical-name → value.
    pub fn canonical_values(&self) -> Result<HashMap<&'static str, f64>, NormalizeError> {
        let mut values = HashMap::new();
        for (name, raw) in self.numeric_fields() {
            if let Some(value) = raw.map(|n| n.coerce(name)).transpose()?.flatten() {
                values.insert(name, value);
            }
        }
        let male = self
            .gender
            .as_deref()
            .map_or(false, |g| g.trim().eq_ignore_ascii_case("M"));
        values.insert(GENDER_FEATURE, if male { 1.0 } else { 0.0 });
        Ok(values)
    }
}

/// Position of the filtration rate in [`CANONICAL_FEATURES`].
const CANONICAL_FILTRATION_RATE_INDEX: usize = 9;

/// The ordered feature names the classifier expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureContract {
    names: Vec<String>,
    filtration_rate_index: usize,
}

impl FeatureContract {
    /// Validate a contract: non-empty, no duplicates, includes the filtration rate.
    pub fn new(names: Vec<String>) -> Result<Self, String> {
        if names.is_empty() {
            return Err("feature contract is empty".into());
        }
        for (idx, name) in names.iter().enumerate() {
            if names[..idx].contains(name) {
                return Err(format!("feature '{}' listed twice", name));
            }
        }
        let filtration_rate_index = names
            .iter()
            .position(|n| n == FILTRATION_RATE_FEATURE)
            .ok_or_else(|| {
                format!("feature contract must include '{}'", FILTRATION_RATE_FEATURE)
            })?;
        Ok(Self {
            names,
            filtration_rate_index,
        })
    }

    /// The thirteen canonical features.
    pub fn canonical() -> Self {
        Self {
            names: CANONICAL_FEATURES.iter().map(|n| n.to_string()).collect(),
            filtration_rate_index: CANONICAL_FILTRATION_RATE_INDEX,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Position of the filtration rate; always present.
    pub fn filtration_rate_index(&self) -> usize {
        self.filtration_rate_index
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Maps clinical input onto a feature contract.
#[derive(Debug, Clone)]
pub struct Normalizer {
    contract: FeatureContract,
}

impl Normalizer {
    pub fn new(contract: FeatureContract) -> Self {
        Self { contract }
    }

    pub fn contract(&self) -> &FeatureContract {
        &self.contract
    }

    /// Ordered vector in contract order. Features absent from the input, or
    /// not derivable from it, are 0.
    pub fn normalize(&self, input: &ClinicalInput) -> Result<Vec<f64>, NormalizeError> {
        let values = input.canonical_values()?;
        Ok(self
            .contract
            .names()
            .iter()
            .map(|name| values.get(name.as_str()).copied().unwrap_or(0.0))
            .collect())
    }
}

/// Which positions of the ordered vector the scaler rescales.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingPlan {
    /// Contract positions, in the scaler's fit order
    indices: Vec<usize>,
}

impl ScalingPlan {
    /// Use the scaler's recorded fit features; without them, scale every
    /// contract feature except the one-hot gender column.
    pub fn for_scaler(contract: &FeatureContract, scaler: &dyn Scaler) -> ModelResult<Self> {
        match scaler.fitted_features() {
            Some(fitted) => {
                let indices = fitted
                    .iter()
                    .map(|name| {
                        contract.position(name).ok_or_else(|| {
                            ModelError::InvalidBundle(format!(
                                "scaler was fit on '{}', which is not in the feature contract",
                                name
                            ))
                        })
                    })
                    .collect::<ModelResult<Vec<_>>>()?;
                Ok(Self { indices })
            }
            None => Ok(Self::all_but_gender(contract)),
        }
    }

    /// Default policy: every feature except the one-hot gender column.
    pub fn all_but_gender(contract: &FeatureContract) -> Self {
        Self {
            indices: contract
                .names()
                .iter()
                .enumerate()
                .filter(|(_, name)| name.as_str() != GENDER_FEATURE)
                .map(|(idx, _)| idx)
                .collect(),
        }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Rescale the planned subset; other positions pass through unchanged.
    pub fn apply(&self, values: &[f64], scaler: &dyn Scaler) -> ModelResult<Vec<f64>> {
        let subset = self
            .indices
            .iter()
            .map(|&idx| {
                values.get(idx).copied().ok_or(ModelError::Dimension {
                    expected: idx + 1,
                    actual: values.len(),
                })
            })
            .collect::<ModelResult<Vec<_>>>()?;

        let scaled = scaler.transform(&subset)?;
        if scaled.len() != subset.len() {
            return Err(ModelError::Dimension {
                expected: subset.len(),
                actual: scaled.len(),
            });
        }

        let mut out = values.to_vec();
        for (&idx, value) in self.indices.iter().zip(scaled) {
            out[idx] = value;
        }
        Ok(out)
    }
}
