//! Stage and risk derivation.
//!
//! Both functions are total: every float maps to exactly one label. Bounds
//! are closed below and evaluated from the top down.

use crate::models::{CkdStage, RiskLevel};

/// Lower filtration-rate bound of stages 1 to 4 (mL/min/1.73m²).
pub const STAGE_THRESHOLDS: [(f64, CkdStage); 4] = [
    (90.0, CkdStage::Stage1),
    (60.0, CkdStage::Stage2),
    (30.0, CkdStage::Stage3),
    (15.0, CkdStage::Stage4),
];

/// Lower confidence bound of the High and Medium risk bands.
pub const RISK_THRESHOLDS: [(f64, RiskLevel); 2] = [(0.9, RiskLevel::High), (0.7, RiskLevel::Medium)];

/// Map a filtration rate to a stage. NaN falls through to Stage 5.
pub fn derive_stage(filtration_rate: f64) -> CkdStage {
    STAGE_THRESHOLDS
        .iter()
        .find(|(bound, _)| filtration_rate >= *bound)
        .map(|(_, stage)| *stage)
        .unwrap_or(CkdStage::Stage5)
}

/// Map a classifier confidence to a risk band. NaN falls through to Low.
pub fn derive_risk(confidence: f64) -> RiskLevel {
    RISK_THRESHOLDS
        .iter()
        .find(|(bound, _)| confidence >= *bound)
        .map(|(_, risk)| *risk)
        .unwrap_or(RiskLevel::Low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_stage_boundaries() {
        assert_eq!(derive_stage(90.0), CkdStage::Stage1);
        assert_eq!(derive_stage(89.999), CkdStage::Stage2);
        assert_eq!(derive_stage(60.0), CkdStage::Stage2);
        assert_eq!(derive_stage(59.999), CkdStage::Stage3);
        assert_eq!(derive_stage(30.0), CkdStage::Stage3);
        assert_eq!(derive_stage(29.999), CkdStage::Stage4);
        assert_eq!(derive_stage(15.0), CkdStage::Stage4);
        assert_eq!(derive_stage(14.999), CkdStage::Stage5);
        assert_eq!(derive_stage(0.0), CkdStage::Stage5);
        assert_eq!(derive_stage(-5.0), CkdStage::Stage5);
        assert_eq!(derive_stage(f64::NAN), CkdStage::Stage5);
        assert_eq!(derive_stage(f64::INFINITY), CkdStage::Stage1);
    }

    #[test]
    fn test_risk_boundaries() {
        assert_eq!(derive_risk(1.0), RiskLevel::High);
        assert_eq!(derive_risk(0.9), RiskLevel::High);
        assert_eq!(derive_risk(0.8999), RiskLevel::Medium);
        assert_eq!(derive_risk(0.7), RiskLevel::Medium);
        assert_eq!(derive_risk(0.6999), RiskLevel::Low);
        assert_eq!(derive_risk(0.0), RiskLevel::Low);
        assert_eq!(derive_risk(f64::NAN), RiskLevel::Low);
    }

    proptest! {
        #[test]
        fn stage_is_monotonic(a in -50.0f64..200.0, b in -50.0f64..200.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            // Higher filtration never yields a more severe stage
            prop_assert!(derive_stage(hi) <= derive_stage(lo));
        }

        #[test]
        fn stage_matches_thresholds(rate in -50.0f64..200.0) {
            let expected = if rate >= 90.0 {
                CkdStage::Stage1
            } else if rate >= 60.0 {
                CkdStage::Stage2
            } else if rate >= 30.0 {
                CkdStage::Stage3
            } else if rate >= 15.0 {
                CkdStage::Stage4
            } else {
                CkdStage::Stage5
            };
            prop_assert_eq!(derive_stage(rate), expected);
        }

        #[test]
        fn risk_is_deterministic(c in 0.0f64..=1.0) {
            let first = derive_risk(c);
            prop_assert_eq!(derive_risk(c), first);
            let expected = if c >= 0.9 {
                RiskLevel::High
            } else if c >= 0.7 {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            };
            prop_assert_eq!(first, expected);
        }
    }
}
