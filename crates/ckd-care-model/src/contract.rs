//! Collaborator contracts for the classifier stack.
//!
//! The prediction pipeline only sees these traits, so tests and alternative
//! model runtimes can be swapped in without touching the pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Model errors.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid model bundle: {0}")]
    InvalidBundle(String),

    #[error("Expected {expected} feature values, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("Inference error: {0}")]
    Inference(String),
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Per-class probabilities produced by a classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassScores {
    /// Class labels, index-aligned with `probabilities`
    pub classes: Vec<String>,
    /// Probability per class (0.0 - 1.0)
    pub probabilities: Vec<f64>,
}

impl ClassScores {
    /// Check the scores are well formed: aligned, non-empty, finite, within [0, 1].
    pub fn validate(&self) -> ModelResult<()> {
        if self.classes.is_empty() {
            return Err(ModelError::Inference("classifier returned no classes".into()));
        }
        if self.classes.len() != self.probabilities.len() {
            return Err(ModelError::Inference(format!(
                "{} classes but {} probabilities",
                self.classes.len(),
                self.probabilities.len()
            )));
        }
        if let Some(bad) = self
            .probabilities
            .iter()
            .find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0)
        {
            return Err(ModelError::Inference(format!(
                "probability out of range: {}",
                bad
            )));
        }
        Ok(())
    }

    /// The most probable class and its probability.
    ///
    /// On equal probabilities the earliest class wins.
    pub fn top(&self) -> Option<(&str, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, p) in self.probabilities.iter().copied().enumerate() {
            match best {
                Some((_, best_p)) if p <= best_p => {}
                _ => best = Some((idx, p)),
            }
        }
        best.and_then(|(idx, p)| self.classes.get(idx).map(|c| (c.as_str(), p)))
    }
}

/// A trained classifier over the ordered, scaled feature vector.
///
/// Implementations must be deterministic for identical input and model version.
pub trait Classifier: Send + Sync {
    /// Model identifier persisted with every prediction.
    fn name(&self) -> &str;

    /// Score one feature vector.
    fn predict(&self, features: &[f64]) -> ModelResult<ClassScores>;
}

/// A fitted feature scaler.
pub trait Scaler: Send + Sync {
    /// Names of the features the scaler was fit on, in fit order.
    /// `None` when the scaler did not record them.
    fn fitted_features(&self) -> Option<&[String]>;

    /// Number of features the scaler was fit on.
    fn fitted_len(&self) -> usize;

    /// Rescale the fitted subset of features, in fit order.
    fn transform(&self, values: &[f64]) -> ModelResult<Vec<f64>>;
}

/// Per-feature attribution for a single classifier decision.
pub trait Explainer: Send + Sync {
    /// One weight per input feature, index-aligned with `features`.
    fn attribute(&self, features: &[f64]) -> ModelResult<Vec<f64>>;
}
