//! Service configuration: a JSON file with every field defaulted, plus
//! environment overrides for the two paths deployments change most.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analytics::ModelEvaluation;
use crate::predict::PipelineTimeouts;
use crate::{CareError, CareResult};

/// Overrides `database_path`.
pub const DATABASE_ENV: &str = "CKD_CARE_DATABASE";

/// Overrides `model_bundle_path`.
pub const MODEL_BUNDLE_ENV: &str = "CKD_CARE_MODEL_BUNDLE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CareConfig {
    pub database_path: PathBuf,
    /// Without a bundle, prediction reports the model as unavailable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_bundle_path: Option<PathBuf>,
    /// Replacement for the built-in stage → plan table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation_plans_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explainer_timeout_ms: Option<u64>,
    /// Length of the analytics "recent predictions" list
    pub recent_predictions_limit: usize,
    /// Offline evaluation of the deployed classifier. Reported as is.
    pub model_evaluation: ModelEvaluation,
}

impl Default for CareConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("ckd_care.db"),
            model_bundle_path: None,
            recommendation_plans_path: None,
            classifier_timeout_ms: Some(2_000),
            explainer_timeout_ms: Some(5_000),
            recent_predictions_limit: 10,
            model_evaluation: ModelEvaluation::default(),
        }
    }
}

impl CareConfig {
    pub fn from_json(json: &str) -> CareResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CareError::Configuration(format!("invalid config: {}", e)))
    }

    /// Read a config file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> CareResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            CareError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_json(&json)?;
        config.apply_env();
        Ok(config)
    }

    /// Apply `CKD_CARE_DATABASE` / `CKD_CARE_MODEL_BUNDLE` when set.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(path) = set(DATABASE_ENV) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(path) = set(MODEL_BUNDLE_ENV) {
            self.model_bundle_path = Some(PathBuf::from(path));
        }
    }

    pub fn timeouts(&self) -> PipelineTimeouts {
        PipelineTimeouts {
            classifier: self.classifier_timeout_ms.map(Duration::from_millis),
            explainer: self.explainer_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = CareConfig::from_json("{}").unwrap();
        assert_eq!(config, CareConfig::default());
        assert_eq!(config.recent_predictions_limit, 10);
        assert_eq!(config.timeouts().classifier, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_partial_file() {
        let config = CareConfig::from_json(
            r#"{
                "database_path": "/var/lib/ckd/care.db",
                "explainer_timeout_ms": null,
                "model_evaluation": { "accuracy": 0.5 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/ckd/care.db"));
        assert_eq!(config.timeouts().explainer, None);
        assert_eq!(config.model_evaluation.accuracy, 0.5);
        assert_eq!(config.model_evaluation.recall, 0.9823);
    }

    #[test]
    fn test_unknown_key_is_configuration_error() {
        assert!(matches!(
            CareConfig::from_json(r#"{ "databse_path": "x.db" }"#),
            Err(CareError::Configuration(_))
        ));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = CareConfig::default();
        config.apply_overrides(|key| match key {
            DATABASE_ENV => Some("/tmp/override.db".into()),
            MODEL_BUNDLE_ENV => Some("  ".into()),
            _ => None,
        });
        assert_eq!(config.database_path, PathBuf::from("/tmp/override.db"));
        assert_eq!(config.model_bundle_path, None);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("care.json");
        std::fs::write(&path, r#"{ "recent_predictions_limit": 3 }"#).unwrap();
        let config = CareConfig::load(&path).unwrap();
        assert_eq!(config.recent_predictions_limit, 3);

        assert!(matches!(
            CareConfig::load(dir.path().join("missing.json")),
            Err(CareError::Configuration(_))
        ));
    }
}
