//! Relative volume on the base timeframe, signed by the last bar's direction.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use confluence_core::{
    ComponentResult, DataClass, IndicatorAdapter, MarketSnapshot, TimeframeRole,
    TimeframesConfig, TransformConfig,
};
use serde_json::json;

use super::{bias_label, mean};
use crate::transform::ScoreTransform;

/// Volume confirmation indicator.
///
/// Relative volume (last bar over the trailing average) goes through a
/// sigmoid centred on 1.0. A heavy up bar scores high, a heavy down bar
/// scores low, and average volume stays near neutral.
#[derive(Debug, Clone)]
pub struct VolumeIndicator {
    lookback: usize,
    transform: ScoreTransform,
    min_rows: usize,
}

impl VolumeIndicator {
    #[must_use]
    pub fn new(transforms: &TransformConfig, timeframes: &TimeframesConfig) -> Self {
        Self {
            lookback: 20,
            transform: ScoreTransform::ratio(transforms),
            min_rows: timeframes.min_rows(TimeframeRole::Base),
        }
    }

    fn required_rows(&self) -> usize {
        self.min_rows.max(self.lookback + 1)
    }
}

#[async_trait]
impl IndicatorAdapter for VolumeIndicator {
    async fn compute(&self, snapshot: &MarketSnapshot) -> Result<ComponentResult> {
        let frame = snapshot
            .frame(TimeframeRole::Base)
            .ok_or_else(|| anyhow!("no base timeframe"))?;
        let volumes = frame.finite_volumes();
        let closes = frame.finite_closes();
        if volumes.len() < self.lookback + 1 || closes.len() < 2 {
            bail!("need {} base bars, have {}", self.lookback + 1, volumes.len());
        }

        let (history, last) = volumes.split_at(volumes.len() - 1);
        let window = &history[history.len() - self.lookback..];
        let average = mean(window).unwrap_or(0.0);
        if average <= 0.0 {
            bail!("trailing volume is zero");
        }
        let relative = last[0] / average;
        let magnitude = self.transform.apply(relative);

        let up = closes[closes.len() - 1] >= closes[closes.len() - 2];
        let score = if up { magnitude } else { 100.0 - magnitude };

        Ok(ComponentResult::new(score)
            .with_component("relative_volume", magnitude)
            .with_signal("volume", bias_label(score))
            .with_metadata("relative_volume_raw", relative)
            .with_metadata("average_volume", average))
    }

    fn name(&self) -> &str {
        "volume"
    }

    fn data_class(&self) -> DataClass {
        DataClass::Volume
    }

    fn can_run(&self, snapshot: &MarketSnapshot) -> bool {
        snapshot.usable_rows(TimeframeRole::Base) >= self.required_rows()
    }

    fn cache_params(&self) -> serde_json::Value {
        json!({ "lookback": self.lookback, "transform": self.transform })
    }

    fn cache_input(&self, snapshot: &MarketSnapshot) -> Option<serde_json::Value> {
        serde_json::to_value(snapshot.frame(TimeframeRole::Base)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::fixtures::{frame, snapshot_with, trending};

    fn indicator() -> VolumeIndicator {
        VolumeIndicator::new(&TransformConfig::default(), &TimeframesConfig::default())
    }

    #[tokio::test]
    async fn volume_spike_on_up_bar_is_bullish() {
        let mut volumes = vec![100.0; 60];
        volumes[59] = 300.0;
        let snap = snapshot_with(
            TimeframeRole::Base,
            frame(&trending(60, 100.0, 1.0), Some(&volumes)),
        );

        let result = indicator().compute(&snap).await.unwrap();
        assert!(result.score > 95.0);
        assert!((result.metadata["relative_volume_raw"] - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn volume_spike_on_down_bar_is_bearish() {
        let mut volumes = vec![100.0; 60];
        volumes[59] = 300.0;
        let snap = snapshot_with(
            TimeframeRole::Base,
            frame(&trending(60, 100.0, -1.0), Some(&volumes)),
        );

        let result = indicator().compute(&snap).await.unwrap();
        assert!(result.score < 5.0);
    }

    #[tokio::test]
    async fn average_volume_is_neutral() {
        let snap = snapshot_with(TimeframeRole::Base, frame(&trending(60, 100.0, 1.0), None));
        let result = indicator().compute(&snap).await.unwrap();
        assert!((result.score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn needs_min_rows_on_base() {
        let snap = snapshot_with(TimeframeRole::Base, frame(&trending(30, 100.0, 1.0), None));
        assert!(!indicator().can_run(&snap));
    }
}
