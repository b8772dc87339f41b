//! Order book depth imbalance, damped by spread quality.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use confluence_core::{
    ComponentResult, DataClass, IndicatorAdapter, MarketSnapshot, OrderBook, TransformConfig,
};
use serde_json::json;

use super::bias_label;
use crate::transform::ScoreTransform;

/// Depth imbalance indicator.
///
/// The imbalance over the top `levels` goes through a hyperbolic
/// transform. Spread quality (100 at zero spread, halving every
/// `spread_half_life_bps`) scales how far the score may move from neutral:
/// a wide book carries at most half of the imbalance signal.
#[derive(Debug, Clone)]
pub struct OrderBookIndicator {
    levels: usize,
    spread_half_life_bps: f64,
    imbalance: ScoreTransform,
}

impl OrderBookIndicator {
    #[must_use]
    pub fn new(transforms: &TransformConfig) -> Self {
        Self {
            levels: 10,
            spread_half_life_bps: 5.0,
            imbalance: ScoreTransform::imbalance(transforms),
        }
    }

    /// Overrides the number of levels summed per side.
    #[must_use]
    pub fn with_levels(mut self, levels: usize) -> Self {
        self.levels = levels.max(1);
        self
    }

    fn spread_quality(&self, book: &OrderBook) -> Option<(f64, f64)> {
        let spread = book.spread_bps()?;
        let quality = ScoreTransform::ExponentialDecay {
            target: 0.0,
            half_life: self.spread_half_life_bps,
        }
        .apply(spread.max(0.0));
        Some((spread, quality))
    }
}

#[async_trait]
impl IndicatorAdapter for OrderBookIndicator {
    async fn compute(&self, snapshot: &MarketSnapshot) -> Result<ComponentResult> {
        let book = snapshot
            .orderbook
            .as_ref()
            .ok_or_else(|| anyhow!("no order book"))?;
        if book.bids.is_empty() || book.asks.is_empty() {
            bail!("order book side empty");
        }

        let raw = book.imbalance(self.levels);
        let imbalance_score = self.imbalance.apply(raw);
        let (spread, quality) = self
            .spread_quality(book)
            .ok_or_else(|| anyhow!("no valid mid price"))?;

        let damping = 0.5 + 0.5 * quality / 100.0;
        let score = 50.0 + (imbalance_score - 50.0) * damping;

        Ok(ComponentResult::new(score)
            .with_component("imbalance", imbalance_score)
            .with_component("spread_quality", quality)
            .with_signal("book", bias_label(score))
            .with_metadata("imbalance_raw", raw)
            .with_metadata("spread_bps", spread))
    }

    fn name(&self) -> &str {
        "orderbook"
    }

    fn data_class(&self) -> DataClass {
        DataClass::OrderBook
    }

    fn can_run(&self, snapshot: &MarketSnapshot) -> bool {
        snapshot
            .orderbook
            .as_ref()
            .is_some_and(|b| !b.bids.is_empty() && !b.asks.is_empty())
    }

    fn cache_params(&self) -> serde_json::Value {
        json!({
            "levels": self.levels,
            "spread_half_life_bps": self.spread_half_life_bps,
            "transform": self.imbalance,
        })
    }

    fn cache_input(&self, snapshot: &MarketSnapshot) -> Option<serde_json::Value> {
        serde_json::to_value(&snapshot.orderbook).ok()
    }
}
