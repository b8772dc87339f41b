pub mod aggregator;
pub mod cache;
pub mod indicators;
pub mod normalizer;
pub mod payload;
pub mod registry;
pub mod transform;
pub mod validator;
pub mod weights;

// Re-export the analyzer entry point
pub use aggregator::ConfluenceAnalyzer;

// Re-export cache
pub use cache::{
    CacheError, CacheMetrics, CacheMetricsSnapshot, CacheStore, MemoryStore, ResilientStore,
    StampedeCache,
};

// Re-export transforms
pub use transform::{
    bounded_oscillator, exponential_decay, extreme_value, hyperbolic, sigmoid, OscillatorBands,
    ScoreTransform,
};

// Re-export normalization and validation
pub use normalizer::{NormalizationReport, Normalized, RoleSource, TimeframeNormalizer};
pub use validator::{MarketDataValidator, StructuralOutcome, ValidationReport, Verdict};

// Re-export registry and weights
pub use registry::{compute_guarded, IndicatorRegistry};
pub use weights::{Combination, WeightTable, WEIGHT_TOLERANCE};
