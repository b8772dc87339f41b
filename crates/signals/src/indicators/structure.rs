//! Higher-timeframe range position.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use confluence_core::{
    ComponentResult, DataClass, IndicatorAdapter, MarketSnapshot, TimeframeRole,
    TimeframesConfig, TransformConfig,
};
use serde_json::json;

use super::bias_label;
use crate::transform::ScoreTransform;

/// Scores where price sits inside the recent `htf` range.
///
/// Proximity to the range low scores bullish (support), proximity to the
/// range high scores bearish (resistance). Proximity is an exponential
/// decay with a half-life of `decay_half_life_pct` of the level.
#[derive(Debug, Clone)]
pub struct PriceStructureIndicator {
    lookback: usize,
    half_life_pct: f64,
    min_rows: usize,
}

impl PriceStructureIndicator {
    #[must_use]
    pub fn new(transforms: &TransformConfig, timeframes: &TimeframesConfig) -> Self {
        Self {
            lookback: 50,
            half_life_pct: transforms.decay_half_life_pct,
            min_rows: timeframes.min_rows(TimeframeRole::Htf),
        }
    }

    fn proximity(&self, price: f64, level: f64) -> f64 {
        ScoreTransform::ExponentialDecay {
            target: level,
            half_life: level.abs() * self.half_life_pct / 100.0,
        }
        .apply(price)
    }
}

#[async_trait]
impl IndicatorAdapter for PriceStructureIndicator {
    async fn compute(&self, snapshot: &MarketSnapshot) -> Result<ComponentResult> {
        let htf = snapshot
            .frame(TimeframeRole::Htf)
            .ok_or_else(|| anyhow!("no htf timeframe"))?;
        let start = htf.len().saturating_sub(self.lookback);
        let finite = |col: &[f64]| -> Vec<f64> {
            col[start..].iter().copied().filter(|v| v.is_finite()).collect()
        };
        let highs = finite(htf.high.as_slice());
        let lows = finite(htf.low.as_slice());
        if highs.is_empty() || lows.is_empty() {
            bail!("htf range has no finite values");
        }
        let range_high = highs.iter().copied().fold(f64::MIN, f64::max);
        let range_low = lows.iter().copied().fold(f64::MAX, f64::min);

        // Prefer the freshest close available
        let price = TimeframeRole::ALL
            .iter()
            .find_map(|role| snapshot.frame(*role).and_then(|f| f.last_close()))
            .ok_or_else(|| anyhow!("no close price"))?;

        let support = self.proximity(price, range_low);
        let resistance = self.proximity(price, range_high);
        let score = 50.0 + (support - resistance) / 2.0;

        let position = if range_high > range_low {
            (price - range_low) / (range_high - range_low)
        } else {
            0.5
        };

        Ok(ComponentResult::new(score)
            .with_component("support_proximity", support)
            .with_component("resistance_proximity", resistance)
            .with_signal("structure", bias_label(score))
            .with_metadata("range_high", range_high)
            .with_metadata("range_low", range_low)
            .with_metadata("range_position", position))
    }

    fn name(&self) -> &str {
        "price_structure"
    }

    fn data_class(&self) -> DataClass {
        DataClass::Structure
    }

    fn can_run(&self, snapshot: &MarketSnapshot) -> bool {
        snapshot.usable_rows(TimeframeRole::Htf) >= self.min_rows.max(2)
    }

    fn cache_params(&self) -> serde_json::Value {
        json!({ "lookback": self.lookback, "half_life_pct": self.half_life_pct })
    }
}
