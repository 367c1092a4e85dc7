//! Prediction records and their immutable input snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::labels::{now, CkdStage, HealthStatus, RiskLevel};
use super::patient::generate_id;
use crate::predict::{derive_risk, derive_stage, FILTRATION_RATE_FEATURE};

/// The exact feature vectors a prediction was made from.
///
/// `values` is the normalized, unscaled vector in feature-contract order;
/// `model_input` is what the classifier actually received after scaling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureSnapshot {
    pub names: Vec<String>,
    pub values: Vec<f64>,
    pub model_input: Vec<f64>,
}

impl FeatureSnapshot {
    /// Normalized value of a named feature.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|idx| self.values.get(idx).copied())
    }

    /// Pairs of (feature name, normalized value).
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// SHA-256 over names and the bit patterns of both vectors, hex encoded.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for name in &self.names {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(encode_f64s(&self.values));
        hasher.update([0xffu8]);
        hasher.update(encode_f64s(&self.model_input));
        hex::encode(hasher.finalize())
    }
}

/// Encode floats as little-endian bytes (bit exact).
pub fn encode_f64s(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian float bytes. `None` if the length is not a multiple of 8.
pub fn decode_f64s(bytes: &[u8]) -> Option<Vec<f64>> {
    if bytes.len() % 8 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                f64::from_le_bytes(buf)
            })
            .collect(),
    )
}

/// Classifier outcome plus the labels derived from it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PredictionResult {
    /// Binary classifier flag: positive class predicted
    pub ckd_binary: bool,
    /// Stage derived from the raw filtration rate (not from the classifier)
    pub ckd_stage: CkdStage,
    /// Highest class probability (0.0 - 1.0)
    pub confidence: f64,
    /// Band derived from `confidence`
    pub risk_level: RiskLevel,
}

/// An append-only prediction record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    /// Stable id (`PRED_` prefix)
    pub prediction_id: String,
    pub patient_id: String,
    /// Clinician who requested the prediction, if any
    pub clinician_id: Option<String>,
    /// Immutable copy of the inputs
    pub input: FeatureSnapshot,
    pub result: PredictionResult,
    /// One weight per feature in `input.names`; absent when the explainer
    /// was unavailable
    pub attribution: Option<Vec<f64>>,
    /// Classifier identifier
    pub model_used: String,
    /// Digest of `input` taken at creation
    pub input_digest: String,
    pub created_at: DateTime<Utc>,
}

impl Prediction {
    /// Create a new prediction, fingerprinting its input snapshot.
    pub fn new(
        patient_id: String,
        clinician_id: Option<String>,
        input: FeatureSnapshot,
        result: PredictionResult,
        attribution: Option<Vec<f64>>,
        model_used: String,
    ) -> Self {
        let input_digest = input.digest();
        Self {
            prediction_id: generate_id("PRED"),
            patient_id,
            clinician_id,
            input,
            result,
            attribution,
            model_used,
            input_digest,
            created_at: now(),
        }
    }

    /// Presentation status used by the patient query filters.
    pub fn health_status(&self) -> HealthStatus {
        if self.result.ckd_binary {
            HealthStatus::Ckd(self.result.ckd_stage)
        } else {
            HealthStatus::Healthy
        }
    }

    /// Recompute stage and risk from the stored snapshot alone.
    pub fn rederive(&self) -> (CkdStage, RiskLevel) {
        let rate = self.input.get(FILTRATION_RATE_FEATURE).unwrap_or(0.0);
        (derive_stage(rate), derive_risk(self.result.confidence))
    }

    /// Whether the stored snapshot still matches its creation digest.
    pub fn verify_snapshot(&self) -> bool {
        self.input.digest() == self.input_digest
    }

    /// Attribution weights paired with the snapshot's feature names.
    pub fn named_attribution(&self) -> Option<Vec<(String, f64)>> {
        self.attribution.as_ref().map(|weights| {
            self.input
                .names
                .iter()
                .cloned()
                .zip(weights.iter().copied())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(egfr: f64) -> FeatureSnapshot {
        FeatureSnapshot {
            names: vec!["age".into(), "eGFR".into(), "gender_M".into()],
            values: vec![61.0, egfr, 1.0],
            model_input: vec![0.3, -0.7, 1.0],
        }
    }

    fn prediction(egfr: f64, confidence: f64, ckd: bool) -> Prediction {
        Prediction::new(
            "PAT_1".into(),
            None,
            snapshot(egfr),
            PredictionResult {
                ckd_binary: ckd,
                ckd_stage: derive_stage(egfr),
                confidence,
                risk_level: derive_risk(confidence),
            },
            Some(vec![0.1, -0.4, 0.05]),
            "tiny-logistic".into(),
        )
    }

    #[test]
    fn test_snapshot_get() {
        let snap = snapshot(45.0);
        assert_eq!(snap.get("eGFR"), Some(45.0));
        assert_eq!(snap.get("BUN"), None);
        assert_eq!(snap.iter().count(), 3);
    }

    #[test]
    fn test_float_bytes_are_bit_exact() {
        let values = vec![0.1 + 0.2, -0.0, f64::MIN_POSITIVE, 1e308];
        let decoded = decode_f64s(&encode_f64s(&values)).unwrap();
        for (a, b) in values.iter().zip(decoded.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert!(decode_f64s(&[0u8; 7]).is_none());
    }

    #[test]
    fn test_digest_detects_changes() {
        let p = prediction(45.0, 0.95, true);
        assert!(p.verify_snapshot());
        assert_eq!(p.input_digest.len(), 64);

        let mut tampered = p.clone();
        tampered.input.values[1] = 46.0;
        assert!(!tampered.verify_snapshot());
    }

    #[test]
    fn test_rederive_is_stable() {
        let p = prediction(45.0, 0.95, true);
        let first = p.rederive();
        assert_eq!(first, (CkdStage::Stage3, RiskLevel::High));
        assert_eq!(p.rederive(), first);
        assert_eq!(first, (p.result.ckd_stage, p.result.risk_level));
    }

    #[test]
    fn test_health_status_uses_binary_flag() {
        assert_eq!(
            prediction(45.0, 0.95, true).health_status(),
            HealthStatus::Ckd(CkdStage::Stage3)
        );
        assert_eq!(prediction(45.0, 0.95, false).health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_named_attribution() {
        let named = prediction(45.0, 0.95, true).named_attribution().unwrap();
        assert_eq!(named[1], ("eGFR".to_string(), -0.4));
    }
}
