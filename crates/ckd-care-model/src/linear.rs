//! JSON-loadable linear model stack: logistic classifier, standard scaler and
//! linear attribution.
//!
//! For a linear model with independent features the attribution
//! `w_i * (x_i - baseline_i)` is the exact SHAP value, so no sampling is needed.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::contract::{ClassScores, Classifier, Explainer, ModelError, ModelResult, Scaler};

/// Binary logistic regression over the scaled feature vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticClassifier {
    /// Model identifier (e.g., "Logistic Regression v3")
    pub model_name: String,
    /// One weight per feature in the feature contract
    pub weights: Vec<f64>,
    /// Intercept
    pub bias: f64,
    /// Class labels as `[negative, positive]`
    pub classes: [String; 2],
}

impl LogisticClassifier {
    /// Raw decision value `w · x + b`.
    pub fn decision(&self, features: &[f64]) -> ModelResult<f64> {
        if features.len() != self.weights.len() {
            return Err(ModelError::Dimension {
                expected: self.weights.len(),
                actual: features.len(),
            });
        }
        let z = self
            .weights
            .iter()
            .zip(features.iter())
            .map(|(w, x)| w * x)
            .sum::<f64>();
        Ok(z + self.bias)
    }

    /// Probability of the positive class.
    pub fn positive_probability(&self, features: &[f64]) -> ModelResult<f64> {
        let z = self.decision(features)?;
        if !z.is_finite() {
            return Err(ModelError::Inference(format!("non-finite decision value {}", z)));
        }
        Ok(1.0 / (1.0 + (-z).exp()))
    }
}

impl Classifier for LogisticClassifier {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn predict(&self, features: &[f64]) -> ModelResult<ClassScores> {
        let p = self.positive_probability(features)?;
        Ok(ClassScores {
            classes: self.classes.to_vec(),
            probabilities: vec![1.0 - p, p],
        })
    }
}

/// Standardizes features as `(x - mean) / scale`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StandardScaler {
    /// Features the scaler was fit on, in fit order (absent in older bundles)
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// A scaler that leaves `len` values unchanged.
    pub fn identity(len: usize) -> Self {
        Self {
            feature_names: None,
            mean: vec![0.0; len],
            scale: vec![1.0; len],
        }
    }

    fn validate(&self) -> ModelResult<()> {
        if self.mean.len() != self.scale.len() {
            return Err(ModelError::InvalidBundle(format!(
                "scaler has {} means but {} scales",
                self.mean.len(),
                self.scale.len()
            )));
        }
        if let Some(names) = &self.feature_names {
            if names.len() != self.mean.len() {
                return Err(ModelError::InvalidBundle(format!(
                    "scaler names {} features but was fit on {}",
                    names.len(),
                    self.mean.len()
                )));
            }
        }
        Ok(())
    }
}

impl Scaler for StandardScaler {
    fn fitted_features(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn fitted_len(&self) -> usize {
        self.mean.len()
    }

    fn transform(&self, values: &[f64]) -> ModelResult<Vec<f64>> {
        if values.len() != self.mean.len() {
            return Err(ModelError::Dimension {
                expected: self.mean.len(),
                actual: values.len(),
            });
        }
        Ok(values
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(x, (mean, scale))| {
                // Zero-variance features keep scale 1
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect())
    }
}

/// Linear attribution against a baseline (expected) feature vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinearExplainer {
    pub weights: Vec<f64>,
    pub baseline: Vec<f64>,
}

impl LinearExplainer {
    /// Build an explainer for a logistic classifier.
    pub fn for_classifier(classifier: &LogisticClassifier, baseline: Vec<f64>) -> ModelResult<Self> {
        if baseline.len() != classifier.weights.len() {
            return Err(ModelError::InvalidBundle(format!(
                "explainer baseline has {} values, classifier has {} weights",
                baseline.len(),
                classifier.weights.len()
            )));
        }
        Ok(Self {
            weights: classifier.weights.clone(),
            baseline,
        })
    }
}

impl Explainer for LinearExplainer {
    fn attribute(&self, features: &[f64]) -> ModelResult<Vec<f64>> {
        if features.len() != self.weights.len() {
            return Err(ModelError::Dimension {
                expected: self.weights.len(),
                actual: features.len(),
            });
        }
        Ok(self
            .weights
            .iter()
            .zip(features.iter().zip(self.baseline.iter()))
            .map(|(w, (x, b))| w * (x - b))
            .collect())
    }
}

fn default_positive_class() -> String {
    "Yes".into()
}

/// On-disk model bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleFile {
    /// The feature contract: ordered feature names the classifier expects
    pub feature_names: Vec<String>,
    pub classifier: LogisticClassifier,
    pub scaler: StandardScaler,
    /// Expected scaled feature vector; enables attribution when present
    #[serde(default)]
    pub explainer_baseline: Option<Vec<f64>>,
    /// Class label meaning "CKD present"
    #[serde(default = "default_positive_class")]
    pub positive_class: String,
}

impl BundleFile {
    /// Parse and validate a bundle from JSON.
    pub fn parse(json: &str) -> ModelResult<Self> {
        let bundle: BundleFile = serde_json::from_str(json)?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Load and validate a bundle from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> ModelResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::parse(&json)
    }

    /// Check internal consistency of the bundle.
    pub fn validate(&self) -> ModelResult<()> {
        if self.feature_names.is_empty() {
            return Err(ModelError::InvalidBundle("feature contract is empty".into()));
        }
        if self.classifier.weights.len() != self.feature_names.len() {
            return Err(ModelError::InvalidBundle(format!(
                "classifier has {} weights for {} features",
                self.classifier.weights.len(),
                self.feature_names.len()
            )));
        }
        self.scaler.validate()?;
        if !self.classifier.classes.contains(&self.positive_class) {
            return Err(ModelError::InvalidBundle(format!(
                "positive class {:?} is not one of {:?}",
                self.positive_class, self.classifier.classes
            )));
        }
        if let Some(baseline) = &self.explainer_baseline {
            LinearExplainer::for_classifier(&self.classifier, baseline.clone())?;
        }
        Ok(())
    }

    /// The explainer described by this bundle, if it carries a baseline.
    pub fn explainer(&self) -> Option<LinearExplainer> {
        self.explainer_baseline
            .as_ref()
            .and_then(|b| LinearExplainer::for_classifier(&self.classifier, b.clone()).ok())
    }
}
