use thiserror::Error;

/// Failure taxonomy of the scoring engine.
///
/// None of these ever reach a caller of the analyzer: each one is mapped to
/// a documented default (neutral score, fallback store, corrected weight)
/// and logged.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Structural or semantic defect in the incoming payload.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A single indicator or transform failed.
    #[error("indicator '{indicator}' failed: {reason}")]
    Computation { indicator: String, reason: String },

    /// The cache backing store could not be reached.
    #[error("cache store unavailable: {0}")]
    CacheUnavailable(String),

    /// Missing or invalid configuration that was auto-corrected.
    #[error("configuration corrected: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Builds a computation error for an indicator.
    pub fn computation(indicator: impl Into<String>, reason: impl ToString) -> Self {
        Self::Computation {
            indicator: indicator.into(),
            reason: reason.to_string(),
        }
    }
}
