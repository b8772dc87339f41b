//! Trade tape imbalance.

use anyhow::{bail, Result};
use async_trait::async_trait;
use confluence_core::{
    ComponentResult, DataClass, IndicatorAdapter, MarketSnapshot, Trade, TradeSide,
    TransformConfig,
};
use serde_json::json;

use super::bias_label;
use crate::transform::ScoreTransform;

/// Buy/sell aggression from recent trades.
///
/// Combines the volume imbalance (weight 0.7) and the trade count
/// imbalance (weight 0.3), each through a hyperbolic transform.
#[derive(Debug, Clone)]
pub struct OrderFlowIndicator {
    min_trades: usize,
    transform: ScoreTransform,
}

const VOLUME_WEIGHT: f64 = 0.7;
const COUNT_WEIGHT: f64 = 0.3;

/// Signed imbalance in [-1, 1]; 0 when both sides are empty.
fn imbalance(buy: f64, sell: f64) -> f64 {
    let total = buy + sell;
    if total > 0.0 && total.is_finite() {
        (buy - sell) / total
    } else {
        0.0
    }
}

/// `(volume imbalance, count imbalance)` over the given trades.
#[must_use]
pub fn trade_imbalance(trades: &[Trade]) -> (f64, f64) {
    let (mut buy_vol, mut sell_vol, mut buys, mut sells) = (0.0, 0.0, 0.0, 0.0);
    for t in trades.iter().filter(|t| t.size.is_finite() && t.size > 0.0) {
        match t.side {
            TradeSide::Buy => {
                buy_vol += t.size;
                buys += 1.0;
            }
            TradeSide::Sell => {
                sell_vol += t.size;
                sells += 1.0;
            }
        }
    }
    (imbalance(buy_vol, sell_vol), imbalance(buys, sells))
}

impl OrderFlowIndicator {
    #[must_use]
    pub fn new(transforms: &TransformConfig) -> Self {
        Self {
            min_trades: 10,
            transform: ScoreTransform::imbalance(transforms),
        }
    }
}

#[async_trait]
impl IndicatorAdapter for OrderFlowIndicator {
    async fn compute(&self, snapshot: &MarketSnapshot) -> Result<ComponentResult> {
        if snapshot.trades.len() < self.min_trades {
            bail!(
                "need {} trades, have {}",
                self.min_trades,
                snapshot.trades.len()
            );
        }

        let (volume_imb, count_imb) = trade_imbalance(&snapshot.trades);
        let volume_score = self.transform.apply(volume_imb);
        let count_score = self.transform.apply(count_imb);
        let score = volume_score * VOLUME_WEIGHT + count_score * COUNT_WEIGHT;

        Ok(ComponentResult::new(score)
            .with_component("volume_imbalance", volume_score)
            .with_component("count_imbalance", count_score)
            .with_signal("flow", bias_label(score))
            .with_metadata("volume_imbalance_raw", volume_imb)
            .with_metadata("trades", snapshot.trades.len() as f64))
    }

    fn name(&self) -> &str {
        "orderflow"
    }

    fn data_class(&self) -> DataClass {
        DataClass::OrderFlow
    }

    fn can_run(&self, snapshot: &MarketSnapshot) -> bool {
        snapshot.trades.len() >= self.min_trades
    }

    fn cache_params(&self) -> serde_json::Value {
        json!({ "min_trades": self.min_trades, "transform": self.transform })
    }

    fn cache_input(&self, snapshot: &MarketSnapshot) -> Option<serde_json::Value> {
        serde_json::to_value(&snapshot.trades).ok()
    }
}
