//! Indicator adapter contract and scoring result types.
//!
//! Adapters turn a `MarketSnapshot` into a bounded 0–100 score. The
//! aggregator combines those scores into one `ConfluenceResult`.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::snapshot::MarketSnapshot;
use crate::trace::FlowEvent;

/// Score meaning "no signal" and also used as the fallback value.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Clamps a score into [0, 100], mapping non-finite values to neutral.
#[must_use]
pub fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 100.0)
    } else {
        NEUTRAL_SCORE
    }
}

/// Staleness class of the data an indicator depends on.
///
/// Drives the cache TTL chosen for that indicator's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataClass {
    /// Order book derived, stale within seconds
    OrderBook,
    /// Trade tape derived
    OrderFlow,
    /// Momentum / oscillator signals on candles
    Technical,
    /// Volume profile signals on candles
    Volume,
    /// Funding, positioning, liquidations
    Sentiment,
    /// Higher timeframe market structure
    Structure,
}

impl DataClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderBook => "orderbook",
            Self::OrderFlow => "orderflow",
            Self::Technical => "technical",
            Self::Volume => "volume",
            Self::Sentiment => "sentiment",
            Self::Structure => "structure",
        }
    }
}

/// Output of one indicator adapter for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentResult {
    /// Score in [0, 100]
    pub score: f64,
    /// Sub-metric scores that fed the final score
    #[serde(default)]
    pub components: BTreeMap<String, f64>,
    /// Human-readable signal labels
    #[serde(default)]
    pub signals: BTreeMap<String, String>,
    /// Raw numeric values for debugging and analysis
    #[serde(default)]
    pub metadata: BTreeMap<String, f64>,
}

impl ComponentResult {
    /// Creates a result with the given score, clamped into [0, 100].
    #[must_use]
    pub fn new(score: f64) -> Self {
        Self {
            score: clamp_score(score),
            components: BTreeMap::new(),
            signals: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// The fallback result substituted for a failed indicator.
    #[must_use]
    pub fn neutral() -> Self {
        Self::new(NEUTRAL_SCORE)
    }

    /// True if the score is exactly the neutral default.
    #[must_use]
    pub fn is_neutral_default(&self) -> bool {
        self.score == NEUTRAL_SCORE
    }

    /// Adds a sub-score, clamped into [0, 100].
    #[must_use]
    pub fn with_component(mut self, key: impl Into<String>, score: f64) -> Self {
        self.components.insert(key.into(), clamp_score(score));
        self
    }

    #[must_use]
    pub fn with_signal(mut self, key: impl Into<String>, label: impl Into<String>) -> Self {
        self.signals.insert(key.into(), label.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Per-component contribution to the confluence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentBreakdown {
    pub score: f64,
    pub weight: f64,
    /// `score * weight`
    pub contribution: f64,
    #[serde(default)]
    pub sub_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub signals: BTreeMap<String, String>,
}

/// Call-level metadata attached to every result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub flow_id: String,
    pub symbol: String,
    /// Wall time of the analysis call in milliseconds
    pub calculation_time: f64,
    /// Fraction of indicators able to run on the payload
    #[serde(default)]
    pub validity_ratio: Option<f64>,
    /// Set when fewer indicators than the degraded threshold could run
    #[serde(default)]
    pub degraded: bool,
    /// Reason the result fell back to full defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<Vec<FlowEvent>>,
}

/// Consensus score for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceResult {
    /// Result time (ms since epoch)
    pub timestamp: i64,
    /// Weighted consensus in [0, 100]
    pub confluence_score: f64,
    /// Fraction of components with a non-neutral score, in [0, 1]
    pub reliability: f64,
    pub scores: BTreeMap<String, f64>,
    pub components: BTreeMap<String, ComponentBreakdown>,
    pub metadata: ResultMetadata,
}

impl ConfluenceResult {
    /// The complete-default result: every indicator neutral, reliability 0.
    #[must_use]
    pub fn neutral_default<'a>(
        timestamp: i64,
        indicators: impl IntoIterator<Item = (&'a str, f64)>,
        metadata: ResultMetadata,
    ) -> Self {
        let mut scores = BTreeMap::new();
        let mut components = BTreeMap::new();
        for (name, weight) in indicators {
            scores.insert(name.to_string(), NEUTRAL_SCORE);
            components.insert(
                name.to_string(),
                ComponentBreakdown {
                    score: NEUTRAL_SCORE,
                    weight,
                    contribution: NEUTRAL_SCORE * weight,
                    sub_scores: BTreeMap::new(),
                    signals: BTreeMap::new(),
                },
            );
        }

        Self {
            timestamp,
            confluence_score: NEUTRAL_SCORE,
            reliability: 0.0,
            scores,
            components,
            metadata,
        }
    }
}

/// Trait for indicator adapters that score one aspect of the market.
///
/// Implementations should be pure with respect to the snapshot and their
/// own parameters: the engine may cache, share, or recompute their results.
#[async_trait]
pub trait IndicatorAdapter: Send + Sync {
    /// Computes a score for the snapshot.
    ///
    /// # Errors
    /// Returns error if the indicator cannot be computed; the caller
    /// substitutes a neutral result.
    async fn compute(&self, snapshot: &MarketSnapshot) -> Result<ComponentResult>;

    /// Returns the name of this indicator.
    fn name(&self) -> &str;

    /// Staleness class used to pick a cache TTL.
    fn data_class(&self) -> DataClass;

    /// Whether the snapshot carries enough data for this indicator.
    fn can_run(&self, _snapshot: &MarketSnapshot) -> bool {
        true
    }

    /// Parameters that distinguish this indicator's results in the cache.
    fn cache_params(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// The part of the snapshot this indicator reads, hashed into its
    /// cache key so different market data never shares a cached result.
    ///
    /// Defaults to the whole snapshot. `None` disables caching for the call.
    fn cache_input(&self, snapshot: &MarketSnapshot) -> Option<serde_json::Value> {
        serde_json::to_value(snapshot).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================
    // ComponentResult Tests
    // ============================================

    #[test]
    fn component_result_clamps_score() {
        assert_eq!(ComponentResult::new(140.0).score, 100.0);
        assert_eq!(ComponentResult::new(-3.0).score, 0.0);
    }

    #[test]
    fn component_result_nan_is_neutral() {
        let r = ComponentResult::new(f64::NAN);
        assert!(r.is_neutral_default());
    }

    #[test]
    fn component_result_builders() {
        let r = ComponentResult::new(72.0)
            .with_component("imbalance", 80.0)
            .with_signal("bias", "bid heavy")
            .with_metadata("raw_imbalance", 0.4);

        assert_eq!(r.components["imbalance"], 80.0);
        assert_eq!(r.signals["bias"], "bid heavy");
        assert!(!r.is_neutral_default());
    }

    #[test]
    fn component_result_serializes_round_trip() {
        let r = ComponentResult::new(61.5).with_component("rsi", 70.0);
        let json = serde_json::to_value(&r).unwrap();
        let back: ComponentResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }

    // ============================================
    // ConfluenceResult Tests
    // ============================================

    #[test]
    fn neutral_default_scores_every_indicator() {
        let result = ConfluenceResult::neutral_default(
            0,
            [("orderbook", 0.5), ("sentiment", 0.5)],
            ResultMetadata::default(),
        );

        assert_eq!(result.confluence_score, NEUTRAL_SCORE);
        assert_eq!(result.reliability, 0.0);
        assert_eq!(result.scores.len(), 2);
        assert!(result.scores.values().all(|&s| s == NEUTRAL_SCORE));
    }

    #[test]
    fn debug_info_omitted_when_absent() {
        let result = ConfluenceResult::neutral_default(
            0,
            Vec::<(&str, f64)>::new(),
            ResultMetadata::default(),
        );
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("debug_info"));
    }

    // ============================================
    // IndicatorAdapter Tests
    // ============================================

    struct MockAdapter;

    #[async_trait]
    impl IndicatorAdapter for MockAdapter {
        async fn compute(&self, _snapshot: &MarketSnapshot) -> Result<ComponentResult> {
            Ok(ComponentResult::new(65.0))
        }

        fn name(&self) -> &str {
            "mock"
        }

        fn data_class(&self) -> DataClass {
            DataClass::Technical
        }
    }

    #[tokio::test]
    async fn adapter_defaults_allow_running() {
        let adapter = MockAdapter;
        let snap = MarketSnapshot::new("BTCUSDT", 0);

        assert!(adapter.can_run(&snap));
        assert!(adapter.cache_params().is_null());
        assert_eq!(adapter.compute(&snap).await.unwrap().score, 65.0);
    }

    #[test]
    fn default_cache_input_follows_snapshot_data() {
        let adapter = MockAdapter;
        let thin = MarketSnapshot::new("BTCUSDT", 0);
        let book = crate::OrderBook {
            bids: vec![crate::PriceLevel { price: 99.0, size: 5.0 }],
            asks: vec![crate::PriceLevel { price: 101.0, size: 1.0 }],
            timestamp: 0,
        };
        let with_book = thin.clone().with_orderbook(book);

        let a = adapter.cache_input(&thin).unwrap();
        let b = adapter.cache_input(&with_book).unwrap();
        assert_ne!(a, b);
        assert_eq!(a["symbol"], "BTCUSDT");
    }

    #[test]
    fn data_class_names() {
        assert_eq!(DataClass::OrderBook.as_str(), "orderbook");
        let json = serde_json::to_string(&DataClass::OrderFlow).unwrap();
        assert_eq!(json, "\"order_flow\"");
    }
}
