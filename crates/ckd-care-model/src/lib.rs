//! Classifier stack for CKD prediction.
//!
//! This crate defines the collaborator contracts the prediction pipeline calls
//! (classifier, scaler, explainer) and a JSON-loadable linear implementation
//! of them.

pub mod contract;
pub mod linear;

pub use contract::*;
pub use linear::*;
