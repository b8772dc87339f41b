//! Indicator registry.
//!
//! Holds the indicator adapters an analyzer runs, keyed by name. Adapters
//! are shared (`Arc`) so concurrent computations can borrow them without
//! locking.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use confluence_core::{
    ComponentResult, DataClass, EngineConfig, EngineError, IndicatorAdapter, MarketSnapshot,
};
use futures_util::FutureExt;

use crate::indicators;

/// Registry of indicator adapters, ordered by name.
#[derive(Clone, Default)]
pub struct IndicatorRegistry {
    adapters: BTreeMap<String, Arc<dyn IndicatorAdapter>>,
}

impl IndicatorRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the reference indicators named in `config.indicators`.
    ///
    /// Unknown names are skipped with a warning.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut registry = Self::new();
        for name in &config.indicators {
            match indicators::build(name, config) {
                Some(adapter) => registry.register(adapter),
                None => tracing::warn!(indicator = %name, "Unknown indicator, skipping"),
            }
        }
        registry
    }

    /// Registers an adapter under its own name.
    ///
    /// If an adapter with the same name already exists, it will be replaced.
    pub fn register(&mut self, adapter: Arc<dyn IndicatorAdapter>) {
        let name = adapter.name().to_string();
        if self.adapters.insert(name.clone(), adapter).is_some() {
            tracing::debug!(indicator = %name, "Replaced registered indicator");
        }
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn IndicatorAdapter>) -> Self {
        self.register(adapter);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn IndicatorAdapter>> {
        self.adapters.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    /// Names of all registered indicators, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    /// Data class of every registered indicator.
    #[must_use]
    pub fn data_classes(&self) -> BTreeMap<&str, DataClass> {
        self.adapters
            .iter()
            .map(|(name, adapter)| (name.as_str(), adapter.data_class()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn IndicatorAdapter>)> {
        self.adapters.iter().map(|(name, a)| (name.as_str(), a))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Removes an adapter by name.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn IndicatorAdapter>> {
        self.adapters.remove(name)
    }
}

impl std::fmt::Debug for IndicatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

/// Runs one adapter, turning both errors and panics into [`EngineError`].
///
/// # Errors
/// Returns [`EngineError::Computation`] if the adapter fails or panics.
pub async fn compute_guarded(
    adapter: &dyn IndicatorAdapter,
    snapshot: &MarketSnapshot,
) -> Result<ComponentResult, EngineError> {
    match AssertUnwindSafe(adapter.compute(snapshot)).catch_unwind().await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(EngineError::computation(adapter.name(), format!("{e:#}"))),
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panicked".to_string());
            Err(EngineError::computation(
                adapter.name(),
                format!("panic: {reason}"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    struct MockIndicator {
        name: &'static str,
        mode: Mode,
    }

    enum Mode {
        Score(f64),
        Fail,
        Panic,
    }

    #[async_trait]
    impl IndicatorAdapter for MockIndicator {
        async fn compute(&self, _snapshot: &MarketSnapshot) -> Result<ComponentResult> {
            match self.mode {
                Mode::Score(s) => Ok(ComponentResult::new(s)),
                Mode::Fail => anyhow::bail!("Mock indicator failure"),
                Mode::Panic => panic!("mock panic"),
            }
        }

        fn name(&self) -> &str {
            self.name
        }

        fn data_class(&self) -> DataClass {
            DataClass::Technical
        }
    }

    fn mock(name: &'static str, mode: Mode) -> Arc<dyn IndicatorAdapter> {
        Arc::new(MockIndicator { name, mode })
    }

    // ============================================
    // Registration Tests
    // ============================================

    #[test]
    fn registry_new_is_empty() {
        let registry = IndicatorRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn registry_replaces_indicator_with_same_name() {
        let registry = IndicatorRegistry::new()
            .with(mock("a", Mode::Score(10.0)))
            .with(mock("a", Mode::Score(20.0)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_are_sorted() {
        let registry = IndicatorRegistry::new()
            .with(mock("gamma", Mode::Fail))
            .with(mock("alpha", Mode::Fail))
            .with(mock("beta", Mode::Fail));
        assert_eq!(registry.names(), vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn remove_returns_adapter() {
        let mut registry = IndicatorRegistry::new().with(mock("a", Mode::Fail));
        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
    }

    #[test]
    fn from_config_builds_reference_indicators() {
        let mut cfg = EngineConfig::default();
        cfg.indicators.push("astrology".to_string());

        let registry = IndicatorRegistry::from_config(&cfg);

        assert_eq!(registry.len(), 6);
        assert!(!registry.contains("astrology"));
        assert_eq!(registry.data_classes()["orderbook"], DataClass::OrderBook);
    }

    // ============================================
    // Guarded Compute Tests
    // ============================================

    #[tokio::test]
    async fn guarded_compute_passes_results_through() {
        let snap = MarketSnapshot::new("BTCUSDT", 1);
        let result = compute_guarded(mock("a", Mode::Score(64.0)).as_ref(), &snap).await;
        assert_eq!(result.unwrap().score, 64.0);
    }

    #[tokio::test]
    async fn guarded_compute_maps_errors() {
        let snap = MarketSnapshot::new("BTCUSDT", 1);
        let err = compute_guarded(mock("bad", Mode::Fail).as_ref(), &snap)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::computation("bad", "Mock indicator failure")
        );
    }

    #[tokio::test]
    async fn guarded_compute_catches_panics() {
        let snap = MarketSnapshot::new("BTCUSDT", 1);
        let err = compute_guarded(mock("boom", Mode::Panic).as_ref(), &snap)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("mock panic"));
    }
}
