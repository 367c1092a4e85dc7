//! Domain models for the CKD care system.

mod annotation;
mod labels;
mod patient;
mod prediction;
mod recommendation;

pub use annotation::*;
pub use labels::*;
pub use patient::*;
pub use prediction::*;
pub use recommendation::*;
