//! The model bundle: feature contract plus classifier, scaler and optional
//! explainer, constructed once and injected into the prediction pipeline.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ckd_care_model::{BundleFile, Classifier, Explainer, ModelError, ModelResult, Scaler};

use super::normalizer::{FeatureContract, Normalizer, ScalingPlan};

/// Default label of the positive ("CKD present") class.
pub const DEFAULT_POSITIVE_CLASS: &str = "Yes";

/// Everything the pipeline needs to turn a feature vector into scores.
#[derive(Clone)]
pub struct ModelBundle {
    normalizer: Normalizer,
    classifier: Arc<dyn Classifier>,
    scaler: Arc<dyn Scaler>,
    explainer: Option<Arc<dyn Explainer>>,
    scaling: ScalingPlan,
    positive_class: String,
}

impl fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBundle")
            .field("features", &self.normalizer.contract().names())
            .field("classifier", &self.classifier.name())
            .field("scaled_positions", &self.scaling.indices())
            .field("explainer", &self.explainer.is_some())
            .field("positive_class", &self.positive_class)
            .finish()
    }
}

impl ModelBundle {
    /// Assemble a bundle. Fails if the scaler was fit on features outside
    /// the contract, or on a different number of features than it will be
    /// given.
    pub fn new(
        contract: FeatureContract,
        classifier: Arc<dyn Classifier>,
        scaler: Arc<dyn Scaler>,
    ) -> ModelResult<Self> {
        let scaling = ScalingPlan::for_scaler(&contract, scaler.as_ref())?;
        if scaler.fitted_len() != scaling.indices().len() {
            return Err(ModelError::InvalidBundle(format!(
                "scaler was fit on {} features but would scale {}",
                scaler.fitted_len(),
                scaling.indices().len()
            )));
        }
        Ok(Self {
            normalizer: Normalizer::new(contract),
            classifier,
            scaler,
            explainer: None,
            scaling,
            positive_class: DEFAULT_POSITIVE_CLASS.to_string(),
        })
    }

    /// Attach an explainer for per-feature attribution.
    pub fn with_explainer(mut self, explainer: Arc<dyn Explainer>) -> Self {
        self.explainer = Some(explainer);
        self
    }

    /// Override the label treated as "CKD present".
    pub fn with_positive_class(mut self, label: impl Into<String>) -> Self {
        self.positive_class = label.into();
        self
    }

    /// Build from a parsed bundle file.
    pub fn from_bundle_file(file: BundleFile) -> ModelResult<Self> {
        file.validate()?;
        let contract =
            FeatureContract::new(file.feature_names.clone()).map_err(ModelError::InvalidBundle)?;
        let explainer = file.explainer();
        let BundleFile {
            classifier,
            scaler,
            positive_class,
            ..
        } = file;

        let mut bundle = Self::new(contract, Arc::new(classifier), Arc::new(scaler))?
            .with_positive_class(positive_class);
        if let Some(explainer) = explainer {
            bundle = bundle.with_explainer(Arc::new(explainer));
        }
        Ok(bundle)
    }

    /// Load a bundle file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> ModelResult<Self> {
        Self::from_bundle_file(BundleFile::load(path)?)
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn contract(&self) -> &FeatureContract {
        self.normalizer.contract()
    }

    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    pub fn explainer(&self) -> Option<&Arc<dyn Explainer>> {
        self.explainer.as_ref()
    }

    pub fn positive_class(&self) -> &str {
        &self.positive_class
    }

    /// Scale an ordered, normalized vector for the classifier.
    pub fn scale(&self, values: &[f64]) -> ModelResult<Vec<f64>> {
        self.scaling.apply(values, self.scaler.as_ref())
    }
}
