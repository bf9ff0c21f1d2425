//! Error types for the object model.

use thiserror::Error;

/// Errors raised while validating drafts, patches and limits.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Non-finite value for {field}: {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("Invalid size limits: min {min} exceeds max {max}")]
    InvalidLimits { min: f64, max: f64 },

    #[error("World extent must be positive, got {0}")]
    InvalidWorldExtent(f64),
}

pub type Result<T> = std::result::Result<T, ModelError>;
