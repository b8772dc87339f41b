//! Momentum indicator: RSI on the lower and medium timeframes.

use anyhow::{bail, Result};
use async_trait::async_trait;
use confluence_core::{
    ComponentResult, DataClass, IndicatorAdapter, MarketSnapshot, TimeframeRole,
    TimeframesConfig, TransformConfig,
};
use serde_json::json;

use super::bias_label;
use crate::transform::ScoreTransform;

/// Wilder RSI of the most recent bar.
///
/// Returns `None` with fewer than `period + 1` closes or when any close in
/// the window is non-finite.
#[must_use]
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 || closes.iter().any(|c| !c.is_finite()) {
        return None;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let (seed, rest) = changes.split_at(period);

    let mut avg_gain = seed.iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss = -seed.iter().filter(|c| **c < 0.0).sum::<f64>() / period as f64;

    let alpha = 1.0 / period as f64;
    for &ch in rest {
        avg_gain = alpha * ch.max(0.0) + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * (-ch).max(0.0) + (1.0 - alpha) * avg_loss;
    }

    Some(if avg_gain == 0.0 && avg_loss == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    })
}

/// Scores momentum from RSI on `ltf` (weight 0.6) and `mtf` (weight 0.4).
///
/// Each timeframe is used only when it has its configured minimum rows.
#[derive(Debug, Clone)]
pub struct TechnicalIndicator {
    period: usize,
    transform: ScoreTransform,
    ltf_min_rows: usize,
    mtf_min_rows: usize,
}

const LTF_WEIGHT: f64 = 0.6;
const MTF_WEIGHT: f64 = 0.4;

impl TechnicalIndicator {
    #[must_use]
    pub fn new(transforms: &TransformConfig, timeframes: &TimeframesConfig) -> Self {
        Self {
            period: 14,
            transform: ScoreTransform::oscillator(transforms),
            ltf_min_rows: timeframes.min_rows(TimeframeRole::Ltf),
            mtf_min_rows: timeframes.min_rows(TimeframeRole::Mtf),
        }
    }

    /// Overrides the RSI period.
    #[must_use]
    pub fn with_period(mut self, period: usize) -> Self {
        self.period = period.max(1);
        self
    }

    fn required_rows(&self, role: TimeframeRole) -> usize {
        let configured = match role {
            TimeframeRole::Mtf => self.mtf_min_rows,
            _ => self.ltf_min_rows,
        };
        configured.max(self.period + 1)
    }

    fn usable(&self, snapshot: &MarketSnapshot, role: TimeframeRole) -> bool {
        snapshot.usable_rows(role) >= self.required_rows(role)
    }
}

#[async_trait]
impl IndicatorAdapter for TechnicalIndicator {
    async fn compute(&self, snapshot: &MarketSnapshot) -> Result<ComponentResult> {
        let mut parts = Vec::with_capacity(2);
        let mut result = ComponentResult::neutral();

        for (role, weight) in [(TimeframeRole::Ltf, LTF_WEIGHT), (TimeframeRole::Mtf, MTF_WEIGHT)] {
            if !self.usable(snapshot, role) {
                continue;
            }
            let Some(frame) = snapshot.frame(role) else {
                continue;
            };
            if let Some(value) = rsi(&frame.finite_closes(), self.period) {
                let score = self.transform.apply(value);
                result = result
                    .with_component(format!("rsi_{role}"), score)
                    .with_metadata(format!("rsi_{role}_raw"), value);
                parts.push((score, weight));
            }
        }

        if parts.is_empty() {
            bail!("insufficient ltf/mtf data for RSI({})", self.period);
        }

        let total: f64 = parts.iter().map(|(_, w)| w).sum();
        let score = parts.iter().map(|(s, w)| s * w).sum::<f64>() / total;

        let mut out = ComponentResult::new(score).with_signal("momentum", bias_label(score));
        out.components = result.components;
        out.metadata = result.metadata;
        Ok(out)
    }

    fn name(&self) -> &str {
        "technical"
    }

    fn data_class(&self) -> DataClass {
        DataClass::Technical
    }

    fn can_run(&self, snapshot: &MarketSnapshot) -> bool {
        self.usable(snapshot, TimeframeRole::Ltf) || self.usable(snapshot, TimeframeRole::Mtf)
    }

    fn cache_params(&self) -> serde_json::Value {
        json!({
            "period": self.period,
            "transform": self.transform,
            "min_rows": [self.ltf_min_rows, self.mtf_min_rows],
        })
    }
}
